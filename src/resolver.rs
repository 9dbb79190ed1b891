//! Dependency Resolver
//!
//! Turns dependency id lists into value lists. Every id of a list is resolved
//! concurrently and the combined future fails fast on the first error; the
//! sibling loads and executions keep running in their own tasks and their
//! results stay cached on the records.
//!
//! Execution follows the record state machine in [`crate::module`]. A module
//! with an empty dependency list runs inline, in the same step that requested
//! it. Anything that has to wait for dependencies or a load runs in a spawned
//! task that drives the record to a terminal state and drains its waiters.

use crate::cache::CacheHints;
use crate::context::Context;
use crate::error::RuntimeError;
use crate::identifier::{classify, validate_module_id, DependencySpec, Reserved};
use crate::loader::{self, ResourceKind};
use crate::module::{notify_all, Admission, Factory, ModuleKey, WaitHandle};
use crate::readiness;
use crate::runtime::Runtime;
use crate::shim::{export_provider, ShimDeclaration};
use crate::value::{ExternalResource, Value};
use futures::future::{self, try_join_all, BoxFuture, FutureExt};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Wait-for edges between in-flight executions.
///
/// An edge `a -> b` means module `a` is waiting for module `b`. Edges of a
/// module are dropped once it reaches a terminal state.
#[derive(Debug, Default)]
pub(crate) struct WaitGraph {
    edges: HashMap<ModuleKey, BTreeSet<ModuleKey>>,
}

impl WaitGraph {
    /// Add `waiter -> target`, refusing edges that would close a cycle.
    pub(crate) fn link(&mut self, waiter: &ModuleKey, target: &ModuleKey) -> Result<(), RuntimeError> {
        if let Some(path) = self.path(target, waiter) {
            let mut chain = vec![waiter.to_string()];
            chain.extend(path.iter().map(ToString::to_string));
            return Err(RuntimeError::DependencyCycle { chain });
        }
        self.edges
            .entry(waiter.clone())
            .or_default()
            .insert(target.clone());
        Ok(())
    }

    pub(crate) fn release(&mut self, waiter: &ModuleKey) {
        self.edges.remove(waiter);
    }

    fn path(&self, from: &ModuleKey, to: &ModuleKey) -> Option<Vec<ModuleKey>> {
        let mut stack = vec![vec![from.clone()]];
        let mut seen = HashSet::new();
        while let Some(path) = stack.pop() {
            let last = path.last()?.clone();
            if &last == to {
                return Some(path);
            }
            if !seen.insert(last.clone()) {
                continue;
            }
            for next in self.edges.get(&last).into_iter().flatten() {
                let mut extended = path.clone();
                extended.push(next.clone());
                stack.push(extended);
            }
        }
        None
    }
}

/// How an execution ended badly
enum Failure {
    /// Dependencies or a load failed; the record goes back to `Defined`
    Reset(RuntimeError),
    /// The body itself failed; replayed to every later requester
    Terminal(RuntimeError),
}

/// Resolve `deps` in the context, on behalf of `parent` when a module is waiting.
pub(crate) fn resolve(
    context: &Context,
    deps: &[String],
    parent: Option<ModuleKey>,
) -> BoxFuture<'static, Result<Vec<Value>, RuntimeError>> {
    if deps.is_empty() {
        return future::ready(Ok(Vec::new())).boxed();
    }
    // Each id is admitted right away; only the waiting is deferred.
    let pending: Vec<_> = deps
        .iter()
        .map(|raw| resolve_one(context, raw, parent.clone()))
        .collect();
    try_join_all(pending).boxed()
}

fn resolve_one(
    context: &Context,
    raw: &str,
    parent: Option<ModuleKey>,
) -> BoxFuture<'static, Result<Value, RuntimeError>> {
    let id = match context.normalize(raw) {
        Ok(id) => id,
        Err(err) => return future::ready(Err(err)).boxed(),
    };

    match classify(&id) {
        DependencySpec::Reserved(reserved) => {
            future::ready(Ok(capability(context, reserved, parent.as_ref()))).boxed()
        }
        DependencySpec::Instance { context: target } => {
            let value = match context.runtime().get_instance(&target) {
                Some(instance) => Value::Instance(instance),
                None => {
                    warn!(context = %context.id(), target = %target, "Requested instance of unknown context");
                    Value::Null
                }
            };
            future::ready(Ok(value)).boxed()
        }
        DependencySpec::Foreign { context: target, id } => {
            resolve_foreign(context.runtime().clone(), target, id, parent)
        }
        DependencySpec::Local(id) => {
            if let Err(err) = validate_module_id(&id) {
                return future::ready(Err(err)).boxed();
            }
            let key = ModuleKey::new(context.id(), id.as_str());
            match execute(context, key, parent.as_ref()) {
                Some(execution) => execution,
                None => resolve_external(context.clone(), id, parent),
            }
        }
    }
}

fn capability(context: &Context, reserved: Reserved, parent: Option<&ModuleKey>) -> Value {
    match reserved {
        Reserved::Require => Value::Require(context.clone()),
        Reserved::Define => Value::Define(context.clone()),
        Reserved::Exports => parent
            .and_then(|key| {
                context
                    .runtime()
                    .state()
                    .registry
                    .record_mut(key)
                    .map(|record| Value::Exports(record.exports().clone()))
            })
            .unwrap_or(Value::Null),
    }
}

/// `ctx:id`: soft `Null` for unknown contexts or modules the target never defines.
///
/// An undefined foreign module is only loaded through the target context; it
/// is executed here so the requester's wait edge exists before it runs.
fn resolve_foreign(
    runtime: Runtime,
    target: String,
    id: String,
    parent: Option<ModuleKey>,
) -> BoxFuture<'static, Result<Value, RuntimeError>> {
    async move {
        let Some(instance) = runtime.get_instance(&target) else {
            warn!(context = %target, module = %id, "Reference to unknown context resolves to null");
            return Ok(Value::Null);
        };

        let key = ModuleKey::new(target.as_str(), id.as_str());
        if let Some(execution) = execute(&instance, key.clone(), parent.as_ref()) {
            return execution.await;
        }

        readiness::prepare(&instance).await?;
        if !instance.is_defined(&id) {
            load_module(&instance, &id).await?;
        }
        match execute(&instance, key, parent.as_ref()) {
            Some(execution) => execution.await,
            None => {
                debug!(context = %target, module = %id, "Foreign module still undefined after load");
                Ok(Value::Null)
            }
        }
    }
    .boxed()
}

/// Load the resource named by `id` through the context's gateway.
async fn load_module(context: &Context, id: &str) -> Result<String, RuntimeError> {
    let locator = context.locator_for(id)?;
    let request = context.request(
        locator.clone(),
        Some(id.to_string()),
        ResourceKind::Module,
        &CacheHints::default(),
    )?;
    loader::load(context.runtime(), request).await?;
    Ok(locator)
}

/// No record for `id`: load the resource, then execute what it defined.
fn resolve_external(
    context: Context,
    id: String,
    parent: Option<ModuleKey>,
) -> BoxFuture<'static, Result<Value, RuntimeError>> {
    async move {
        let locator = load_module(&context, &id).await?;

        let key = ModuleKey::new(context.id(), id.as_str());
        match execute(&context, key, parent.as_ref()) {
            Some(execution) => execution.await,
            None => {
                debug!(context = %context.id(), module = %id, locator = %locator, "Resource loaded without defining module");
                Ok(Value::External(ExternalResource::new(id, locator)))
            }
        }
    }
    .boxed()
}

/// Execute the record at `key`, or `None` when no such record exists.
///
/// Exactly one caller drives a record out of `Defined`; everyone else waits
/// for the same outcome.
pub(crate) fn execute(
    context: &Context,
    key: ModuleKey,
    parent: Option<&ModuleKey>,
) -> Option<BoxFuture<'static, Result<Value, RuntimeError>>> {
    let runtime = context.runtime();
    let admission = {
        let mut guard = runtime.state();
        let state = &mut *guard;
        let record = state.registry.record_mut(&key)?;
        if !record.is_executed() {
            if let Some(parent) = parent {
                if let Err(err) = state.waits.link(parent, &key) {
                    warn!(error = %err, "Refusing to wait on a dependency cycle");
                    return Some(future::ready(Err(err)).boxed());
                }
            }
        }
        record.admit()
    };

    let execution = match admission {
        Admission::Done(outcome) => future::ready(outcome).boxed(),
        Admission::Wait(rx) => wait(rx, key).boxed(),
        Admission::Run(rx) => {
            start(context, key.clone());
            wait(rx, key).boxed()
        }
    };
    Some(execution)
}

async fn wait(rx: WaitHandle<Value>, key: ModuleKey) -> Result<Value, RuntimeError> {
    rx.await
        .unwrap_or_else(|_| Err(RuntimeError::Abandoned(format!("execution of {}", key))))
}

enum Plan {
    Inline(Option<Factory>),
    Shim(ShimDeclaration),
    Deps(Vec<String>),
}

/// Drive an admitted record, inline when nothing has to be awaited.
fn start(context: &Context, key: ModuleKey) {
    let runtime = context.runtime();
    let plan = {
        let mut state = runtime.state();
        match state.registry.record_mut(&key) {
            None => return,
            Some(record) => match record.shim_declaration() {
                Some(decl) => Plan::Shim(decl.clone()),
                None if record.deps().is_empty() => Plan::Inline(record.take_factory()),
                None => Plan::Deps(record.deps().to_vec()),
            },
        }
    };

    match plan {
        Plan::Inline(factory) => {
            let outcome = invoke(&key, factory, Vec::new());
            complete(runtime, &key, outcome);
        }
        Plan::Shim(decl) => match shim_export(runtime, &key, &decl) {
            Some(value) => {
                debug!(module = %key, export = %decl.exports, "Shim export already present");
                complete(runtime, &key, Ok(value));
            }
            None => {
                let context = context.clone();
                tokio::spawn(async move {
                    let outcome = run_shim(&context, &key, &decl).await;
                    complete(context.runtime(), &key, outcome);
                });
            }
        },
        Plan::Deps(deps) => {
            let context = context.clone();
            tokio::spawn(async move {
                let outcome = match resolve(&context, &deps, Some(key.clone())).await {
                    Ok(args) => {
                        let factory = context
                            .runtime()
                            .state()
                            .registry
                            .record_mut(&key)
                            .and_then(|record| record.take_factory());
                        invoke(&key, factory, args)
                    }
                    Err(err) => Err(Failure::Reset(err)),
                };
                complete(context.runtime(), &key, outcome);
            });
        }
    }
}

fn invoke(key: &ModuleKey, factory: Option<Factory>, args: Vec<Value>) -> Result<Value, Failure> {
    let factory = factory.ok_or_else(|| {
        Failure::Terminal(RuntimeError::FactoryFailed {
            module: key.to_string(),
            message: "factory already consumed".to_string(),
        })
    })?;
    debug!(module = %key, args = args.len(), "Invoking factory");
    factory.invoke(args).map_err(|message| {
        Failure::Terminal(RuntimeError::FactoryFailed {
            module: key.to_string(),
            message,
        })
    })
}

fn shim_export(runtime: &Runtime, key: &ModuleKey, decl: &ShimDeclaration) -> Option<Value> {
    let provider = runtime
        .shim_provider(key)
        .unwrap_or_else(|| export_provider(&decl.exports));
    let globals = runtime.globals();
    provider(globals.as_ref())
}

async fn run_shim(context: &Context, key: &ModuleKey, decl: &ShimDeclaration) -> Result<Value, Failure> {
    resolve(context, &decl.deps, Some(key.clone()))
        .await
        .map_err(Failure::Reset)?;

    let locator = context.resource_path(&decl.src).map_err(Failure::Reset)?;
    let request = context
        .request(locator, Some(key.id.clone()), ResourceKind::Shim, &decl.cache)
        .map_err(Failure::Reset)?;
    loader::load(context.runtime(), request)
        .await
        .map_err(Failure::Reset)?;

    shim_export(context.runtime(), key, decl).ok_or_else(|| {
        Failure::Terminal(RuntimeError::ShimExportMissing {
            id: key.id.clone(),
            export: decl.exports.clone(),
        })
    })
}

/// Move the record to its next state and hand the outcome to every waiter.
fn complete(runtime: &Runtime, key: &ModuleKey, outcome: Result<Value, Failure>) {
    let (waiters, delivered) = {
        let mut state = runtime.state();
        state.waits.release(key);
        let record = match state.registry.record_mut(key) {
            Some(record) => record,
            None => return,
        };
        match outcome {
            Ok(produced) => {
                let (value, waiters) = record.mark_executed(produced);
                (waiters, Ok(value))
            }
            Err(Failure::Reset(err)) => (record.reset(), Err(err)),
            Err(Failure::Terminal(err)) => (record.mark_failed(err.clone()), Err(err)),
        }
    };

    match &delivered {
        Ok(_) => debug!(module = %key, waiters = waiters.len(), "Module executed"),
        Err(err) => warn!(module = %key, error = %err, "Module execution failed"),
    }
    notify_all(waiters, &delivered);
}
