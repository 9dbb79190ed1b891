//! Shim declarations and the host-global capability they read from.
//!
//! A shim exposes a legacy resource, one that publishes a global instead of
//! registering a module, through the dependency graph. Each shim id maps to a
//! provider function; the default provider looks up the declared dotted
//! export path on the injected [`HostGlobals`].

use crate::cache::CacheHints;
use crate::value::Value;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Declared adapter for a non-module resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimDeclaration {
    /// Module id the shim is requested under
    pub id: String,
    /// Resource to load
    pub src: String,
    /// Modules that must be resolved before the resource loads
    #[serde(default)]
    pub deps: Vec<String>,
    /// Dotted global path published by the resource
    pub exports: String,
    #[serde(flatten)]
    pub cache: CacheHints,
}

impl ShimDeclaration {
    pub fn new(id: impl Into<String>, src: impl Into<String>, exports: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            src: src.into(),
            deps: Vec::new(),
            exports: exports.into(),
            cache: CacheHints::default(),
        }
    }

    pub fn with_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps = deps.into_iter().map(Into::into).collect();
        self
    }
}

/// Host global namespace capability
pub trait HostGlobals: Send + Sync {
    /// Value at a dotted path, if every segment is present
    fn lookup(&self, path: &str) -> Option<Value>;
}

/// Provider producing a shim's export
pub type ShimProvider = Arc<dyn Fn(&dyn HostGlobals) -> Option<Value> + Send + Sync>;

/// Provider reading `path` from the host globals
pub fn export_provider(path: &str) -> ShimProvider {
    let path = path.to_string();
    Arc::new(move |globals: &dyn HostGlobals| globals.lookup(&path))
}

/// In-memory global namespace.
///
/// The first path segment names a top-level global; further segments walk
/// into JSON objects or exports tables.
#[derive(Default)]
pub struct GlobalScope {
    globals: RwLock<BTreeMap<String, Value>>,
}

impl GlobalScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.globals.write().insert(name.into(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.globals.write().remove(name)
    }
}

impl HostGlobals for GlobalScope {
    fn lookup(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let root = segments.next()?;
        let mut current = self.globals.read().get(root).cloned()?;
        for segment in segments {
            current = current.property(segment)?;
        }
        Some(current)
    }
}
