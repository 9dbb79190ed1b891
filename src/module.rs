//! Module Table
//!
//! Per-context mapping from module id to module record. A record owns its
//! dependency list, its factory (taken exactly once), its execution state and
//! the queue of requesters waiting for an in-flight execution.

use crate::error::RuntimeError;
use crate::shim::ShimDeclaration;
use crate::value::{Exports, Value};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::oneshot;

/// Sender half handed out to every requester of a pending outcome
pub(crate) type Waiter<T> = oneshot::Sender<Result<T, RuntimeError>>;
pub(crate) type WaitHandle<T> = oneshot::Receiver<Result<T, RuntimeError>>;

type FactoryFn = dyn FnOnce(Vec<Value>) -> Result<Value, String> + Send;

/// Module body: a plain value or a callable invoked with resolved dependencies
pub struct Factory(FactoryKind);

enum FactoryKind {
    Value(Value),
    Func(Box<FactoryFn>),
}

impl Factory {
    pub fn value(value: Value) -> Self {
        Factory(FactoryKind::Value(value))
    }

    pub fn func<F>(f: F) -> Self
    where
        F: FnOnce(Vec<Value>) -> Value + Send + 'static,
    {
        Factory(FactoryKind::Func(Box::new(move |args| Ok(f(args)))))
    }

    pub fn try_func<F>(f: F) -> Self
    where
        F: FnOnce(Vec<Value>) -> Result<Value, String> + Send + 'static,
    {
        Factory(FactoryKind::Func(Box::new(f)))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.0, FactoryKind::Func(_))
    }

    pub(crate) fn invoke(self, args: Vec<Value>) -> Result<Value, String> {
        match self.0 {
            FactoryKind::Value(value) => Ok(value),
            FactoryKind::Func(f) => f(args),
        }
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            FactoryKind::Value(value) => f.debug_tuple("Factory::Value").field(value).finish(),
            FactoryKind::Func(_) => write!(f, "Factory::Func"),
        }
    }
}

/// (context, module id) pair identifying a record runtime-wide
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleKey {
    pub context: String,
    pub id: String,
}

impl ModuleKey {
    pub fn new(context: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.context, self.id)
    }
}

/// Execution state of a record
#[derive(Debug, Clone)]
pub enum ModuleState {
    Defined,
    Executing,
    Executed(Value),
    /// The factory itself failed; replayed to later requesters
    Failed(RuntimeError),
}

pub(crate) enum ModuleBody {
    Factory(Option<Factory>),
    Shim(ShimDeclaration),
}

/// Outcome of asking a record to execute
pub(crate) enum Admission {
    /// Terminal state already reached
    Done(Result<Value, RuntimeError>),
    /// Execution in flight; wait for it
    Wait(WaitHandle<Value>),
    /// Caller won the Defined→Executing transition and must drive execution
    Run(WaitHandle<Value>),
}

pub struct ModuleRecord {
    deps: Vec<String>,
    body: ModuleBody,
    state: ModuleState,
    exports: Exports,
    waiters: Vec<Waiter<Value>>,
}

impl ModuleRecord {
    pub fn new(deps: Vec<String>, factory: Factory) -> Self {
        Self::with_body(deps, ModuleBody::Factory(Some(factory)))
    }

    pub fn shim(declaration: ShimDeclaration) -> Self {
        Self::with_body(declaration.deps.clone(), ModuleBody::Shim(declaration))
    }

    fn with_body(deps: Vec<String>, body: ModuleBody) -> Self {
        Self {
            deps,
            body,
            state: ModuleState::Defined,
            exports: Exports::new(),
            waiters: Vec::new(),
        }
    }

    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    pub fn state(&self) -> &ModuleState {
        &self.state
    }

    pub fn exports(&self) -> &Exports {
        &self.exports
    }

    pub fn is_executed(&self) -> bool {
        matches!(self.state, ModuleState::Executed(_))
    }

    pub fn is_executing(&self) -> bool {
        matches!(self.state, ModuleState::Executing)
    }

    pub fn is_shim(&self) -> bool {
        matches!(self.body, ModuleBody::Shim(_))
    }

    pub(crate) fn shim_declaration(&self) -> Option<&ShimDeclaration> {
        match &self.body {
            ModuleBody::Shim(decl) => Some(decl),
            ModuleBody::Factory(_) => None,
        }
    }

    /// Produced value once executed
    pub fn value(&self) -> Option<Value> {
        match &self.state {
            ModuleState::Executed(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Guarded Defined→Executing transition; exactly one caller gets `Run`.
    pub(crate) fn admit(&mut self) -> Admission {
        match &self.state {
            ModuleState::Executed(value) => Admission::Done(Ok(value.clone())),
            ModuleState::Failed(err) => Admission::Done(Err(err.clone())),
            ModuleState::Executing => {
                let (tx, rx) = oneshot::channel();
                self.waiters.push(tx);
                Admission::Wait(rx)
            }
            ModuleState::Defined => {
                let (tx, rx) = oneshot::channel();
                self.state = ModuleState::Executing;
                self.waiters.push(tx);
                Admission::Run(rx)
            }
        }
    }

    pub(crate) fn take_factory(&mut self) -> Option<Factory> {
        match &mut self.body {
            ModuleBody::Factory(factory) => factory.take(),
            ModuleBody::Shim(_) => None,
        }
    }

    /// Record the produced value; a null result exposes the exports table.
    pub(crate) fn mark_executed(&mut self, produced: Value) -> (Value, Vec<Waiter<Value>>) {
        let value = if produced.is_null() {
            Value::Exports(self.exports.clone())
        } else {
            produced
        };
        self.state = ModuleState::Executed(value.clone());
        (value, std::mem::take(&mut self.waiters))
    }

    pub(crate) fn mark_failed(&mut self, err: RuntimeError) -> Vec<Waiter<Value>> {
        self.state = ModuleState::Failed(err);
        std::mem::take(&mut self.waiters)
    }

    /// Dependencies failed before the factory ran; the record may be requested again.
    pub(crate) fn reset(&mut self) -> Vec<Waiter<Value>> {
        self.state = ModuleState::Defined;
        std::mem::take(&mut self.waiters)
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("deps", &self.deps)
            .field("state", &self.state)
            .field("shim", &self.is_shim())
            .finish()
    }
}

/// Deliver one outcome to every waiter, in arrival order.
pub(crate) fn notify_all<T: Clone>(waiters: Vec<Waiter<T>>, outcome: &Result<T, RuntimeError>) {
    for tx in waiters {
        // A dropped receiver means that requester gave up; the others still get the outcome.
        let _ = tx.send(outcome.clone());
    }
}

#[derive(Debug, Default)]
pub struct ModuleTable {
    records: HashMap<String, ModuleRecord>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record unless the id is taken; first registration wins.
    pub fn define(&mut self, id: &str, record: ModuleRecord) -> bool {
        if self.records.contains_key(id) {
            return false;
        }
        self.records.insert(id.to_string(), record);
        true
    }

    pub fn get(&self, id: &str) -> Option<&ModuleRecord> {
        self.records.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut ModuleRecord> {
        self.records.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.keys().cloned().collect();
        ids.sort();
        ids
    }
}
