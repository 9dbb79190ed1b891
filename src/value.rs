//! Values produced by modules and handed to factories.

use crate::context::Context;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A resolved dependency value.
///
/// Cloning is cheap: opaque objects and export tables are reference counted,
/// so every requester of a module observes the very same instance.
#[derive(Clone)]
pub enum Value {
    Null,
    /// Plain data
    Data(serde_json::Value),
    /// Opaque host object
    Object(Arc<dyn Any + Send + Sync>),
    /// Mutable exports table of a module
    Exports(Exports),
    /// `require` capability bound to a context
    Require(Context),
    /// `define` capability bound to a context
    Define(Context),
    /// Handle to a context (`getInstance:<ctx>`)
    Instance(Context),
    /// A loaded resource that did not register the requested module
    External(ExternalResource),
}

/// Placeholder descriptor for an external resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalResource {
    pub id: String,
    pub locator: String,
    pub kind: String,
}

impl ExternalResource {
    pub fn new(id: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            locator: locator.into(),
            kind: "external".to_string(),
        }
    }
}

impl Value {
    pub fn data(value: impl Into<serde_json::Value>) -> Self {
        Value::Data(value.into())
    }

    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Value::Object(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_data(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Data(data) => Some(data),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Object(obj) => obj.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn as_exports(&self) -> Option<&Exports> {
        match self {
            Value::Exports(exports) => Some(exports),
            _ => None,
        }
    }

    /// Context carried by a capability or instance value
    pub fn as_context(&self) -> Option<&Context> {
        match self {
            Value::Require(ctx) | Value::Define(ctx) | Value::Instance(ctx) => Some(ctx),
            _ => None,
        }
    }

    pub fn as_external(&self) -> Option<&ExternalResource> {
        match self {
            Value::External(ext) => Some(ext),
            _ => None,
        }
    }

    /// Identity comparison: shared objects compare by pointer, data by value.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Data(a), Value::Data(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Exports(a), Value::Exports(b)) => a.ptr_eq(b),
            (Value::Require(a), Value::Require(b))
            | (Value::Define(a), Value::Define(b))
            | (Value::Instance(a), Value::Instance(b)) => a.id() == b.id(),
            (Value::External(a), Value::External(b)) => a == b,
            _ => false,
        }
    }

    /// Walk one property of a value, as a dotted export path does.
    pub fn property(&self, key: &str) -> Option<Value> {
        match self {
            Value::Data(data) => data.get(key).cloned().map(Value::Data),
            Value::Exports(exports) => exports.get(key),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Data(data) => write!(f, "Data({})", data),
            Value::Object(_) => write!(f, "Object(..)"),
            Value::Exports(exports) => write!(f, "Exports({:?})", exports.keys()),
            Value::Require(ctx) => write!(f, "Require({})", ctx.id()),
            Value::Define(ctx) => write!(f, "Define({})", ctx.id()),
            Value::Instance(ctx) => write!(f, "Instance({})", ctx.id()),
            Value::External(ext) => write!(f, "External({} @ {})", ext.id, ext.locator),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Data(value)
    }
}

/// Shared exports table of a module record.
#[derive(Clone, Default)]
pub struct Exports(Arc<RwLock<BTreeMap<String, Value>>>);

impl Exports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.write().insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.read().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.read().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn ptr_eq(&self, other: &Exports) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Exports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Exports").field(&self.keys()).finish()
    }
}
