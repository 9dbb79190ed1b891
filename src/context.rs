//! Context handle
//!
//! A [`Context`] is a cheap, cloneable handle naming one isolated module
//! namespace of a [`Runtime`]. All state lives in the runtime; the handle
//! only carries the context id.

use crate::cache::CacheHints;
use crate::config::{ContextConfig, PackageRef};
use crate::error::RuntimeError;
use crate::identifier::{self, classify, validate_module_id, DependencySpec, Reserved};
use crate::loader::{self, ResourceKind, ResourceRequest};
use crate::module::{Factory, ModuleKey, ModuleRecord, ModuleState};
use crate::readiness::{self, PreProcess};
use crate::registry::ContextSlot;
use crate::resolver;
use crate::runtime::Runtime;
use crate::value::Value;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct Context {
    id: Arc<str>,
    runtime: Runtime,
}

impl Context {
    pub(crate) fn new(id: &str, runtime: Runtime) -> Self {
        Self {
            id: Arc::from(id),
            runtime,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub(crate) fn with_slot<R>(&self, f: impl FnOnce(&mut ContextSlot) -> R) -> Result<R, RuntimeError> {
        let mut state = self.runtime.state();
        let slot = state
            .registry
            .slot_mut(&self.id)
            .ok_or_else(|| RuntimeError::UnknownContext(self.id.to_string()))?;
        Ok(f(slot))
    }

    /// Configuration the context was instantiated with
    pub fn config(&self) -> Result<ContextConfig, RuntimeError> {
        self.with_slot(|slot| slot.config.clone())
    }

    /// Apply this context's aliases to a raw identifier.
    pub fn normalize(&self, raw: &str) -> Result<String, RuntimeError> {
        self.with_slot(|slot| identifier::normalize(raw, &slot.config.paths))
    }

    /// Register a module. `ctx:id` targets another context, queued until it exists.
    ///
    /// Defining an id twice keeps the first definition.
    pub fn define<I, S>(&self, id: &str, deps: I, factory: Factory) -> Result<(), RuntimeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let normalized = self.normalize(id)?;
        let deps: Vec<String> = deps.into_iter().map(Into::into).collect();

        match classify(&normalized) {
            DependencySpec::Foreign { context, id } => self.runtime.define_deferred(&context, &id, deps, factory),
            DependencySpec::Local(module_id) => {
                validate_module_id(&module_id)?;
                let defined = self.with_slot(|slot| slot.table.define(&module_id, ModuleRecord::new(deps, factory)))?;
                if defined {
                    debug!(context = %self.id, module = %module_id, "Module defined");
                } else {
                    debug!(context = %self.id, module = %module_id, "Module already defined, ignoring redefinition");
                }
                Ok(())
            }
            DependencySpec::Instance { .. } | DependencySpec::Reserved(_) => {
                Err(RuntimeError::InvalidIdentifier(id.to_string()))
            }
        }
    }

    /// Resolve `deps` to values in declaration order.
    ///
    /// Waits for runtime readiness (unless the context opts out) and for the
    /// context's one-time initialization. Fails on the first failing id.
    pub fn require<I, S>(&self, deps: I) -> BoxFuture<'static, Result<Vec<Value>, RuntimeError>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let deps: Vec<String> = deps.into_iter().map(Into::into).collect();
        let flags = self.with_slot(|slot| {
            readiness::settle_idle(slot);
            (slot.config.wait, slot.init.is_ready())
        });
        let (wait, initialized) = match flags {
            Ok(flags) => flags,
            Err(err) => return futures::future::ready(Err(err)).boxed(),
        };

        if initialized && (!wait || self.runtime.is_ready()) {
            return resolver::resolve(self, &deps, None);
        }

        // Park behind the readiness latch now so requests keep their arrival order.
        let prepared = readiness::prepare(self);
        let context = self.clone();
        async move {
            prepared.await?;
            resolver::resolve(&context, &deps, None).await
        }
        .boxed()
    }

    /// [`Context::require`] followed by `callback` on the resolved values.
    pub fn require_with<I, S, F, R>(&self, deps: I, callback: F) -> BoxFuture<'static, Result<R, RuntimeError>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(Vec<Value>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let pending = self.require(deps);
        async move { pending.await.map(callback) }.boxed()
    }

    /// Synchronous lookup of an already executed module.
    ///
    /// `Ok(None)` when nothing is defined under `id`, `NotExecuted` when it is
    /// defined but has not run yet.
    pub fn require_sync(&self, id: &str) -> Result<Option<Value>, RuntimeError> {
        let normalized = self.normalize(id)?;
        match classify(&normalized) {
            DependencySpec::Reserved(Reserved::Require) => Ok(Some(Value::Require(self.clone()))),
            DependencySpec::Reserved(Reserved::Define) => Ok(Some(Value::Define(self.clone()))),
            DependencySpec::Reserved(Reserved::Exports) => Ok(Some(Value::Null)),
            DependencySpec::Instance { context } => self
                .runtime
                .get_instance(&context)
                .map(|instance| Some(Value::Instance(instance)))
                .ok_or(RuntimeError::UnknownContext(context)),
            DependencySpec::Foreign { context, id } => {
                let target = self
                    .runtime
                    .get_instance(&context)
                    .ok_or_else(|| RuntimeError::UnknownContext(context.clone()))?;
                target.require_sync(&id)
            }
            DependencySpec::Local(module_id) => self.with_slot(|slot| match slot.table.get(&module_id) {
                None => Ok(None),
                Some(record) => match record.state() {
                    ModuleState::Executed(value) => Ok(Some(value.clone())),
                    ModuleState::Failed(err) => Err(err.clone()),
                    ModuleState::Defined | ModuleState::Executing => {
                        Err(RuntimeError::NotExecuted(module_id.clone()))
                    }
                },
            })?,
        }
    }

    /// Execute a defined module without going through readiness or loading.
    ///
    /// `None` when the id has no record in this context.
    pub fn exec_module(&self, id: &str) -> Option<BoxFuture<'static, Result<Value, RuntimeError>>> {
        let module_id = self.normalize(id).ok()?;
        resolver::execute(self, ModuleKey::new(self.id(), module_id), None)
    }

    /// Load packages one after another, skipping those already instantiated.
    pub fn load_package(&self, packages: Vec<PackageRef>) -> BoxFuture<'static, Result<(), RuntimeError>> {
        let context = self.clone();
        async move { readiness::load_packages(&context, &packages).await }.boxed()
    }

    /// Load an arbitrary script resource through the gateway.
    pub fn load_script(&self, src: &str) -> BoxFuture<'static, Result<(), RuntimeError>> {
        let request = self
            .resource_path(src)
            .and_then(|locator| self.request(locator, None, ResourceKind::Script, &CacheHints::default()));
        let runtime = self.runtime.clone();
        async move { loader::load(&runtime, request?).await }.boxed()
    }

    /// Locator of the resource expected to define `id`
    pub fn module_path(&self, id: &str) -> Result<String, RuntimeError> {
        let module_id = self.normalize(id)?;
        self.locator_for(&module_id)
    }

    pub(crate) fn locator_for(&self, module_id: &str) -> Result<String, RuntimeError> {
        self.with_slot(|slot| {
            format!(
                "{}{}",
                crate::paths::join(&slot.base_path, module_id),
                slot.config.extension
            )
        })
    }

    /// Absolute locator for a configured source path (shims, packages, master files)
    pub fn resource_path(&self, src: &str) -> Result<String, RuntimeError> {
        let location = self.runtime.location();
        self.with_slot(|slot| location.resource_path(&slot.domain, src))
    }

    pub(crate) fn request(
        &self,
        locator: String,
        module_id: Option<String>,
        kind: ResourceKind,
        hints: &CacheHints,
    ) -> Result<ResourceRequest, RuntimeError> {
        let state = self.runtime.state();
        let slot = state
            .registry
            .slot(&self.id)
            .ok_or_else(|| RuntimeError::UnknownContext(self.id.to_string()))?;
        let url = state
            .cache
            .apply(&locator, hints, slot.config.cache_param.as_deref());
        Ok(ResourceRequest {
            context: self.id.to_string(),
            locator,
            url,
            module_id,
            kind,
        })
    }

    pub fn get_instance(&self, id: &str) -> Option<Context> {
        self.runtime.get_instance(id)
    }

    /// Hook awaited at the end of this context's initialization.
    pub fn set_pre_process<F>(&self, hook: F) -> Result<(), RuntimeError>
    where
        F: Fn(Context) -> BoxFuture<'static, Result<(), RuntimeError>> + Send + Sync + 'static,
    {
        let hook: PreProcess = Arc::new(hook);
        self.with_slot(|slot| slot.pre_process = Some(hook))?;
        info!(context = %self.id, "Pre-process hook installed");
        Ok(())
    }

    pub fn is_defined(&self, id: &str) -> bool {
        self.normalize(id)
            .and_then(|module_id| self.with_slot(|slot| slot.table.contains(&module_id)))
            .unwrap_or(false)
    }

    pub fn is_initialized(&self) -> bool {
        self.with_slot(|slot| slot.init.is_ready()).unwrap_or(false)
    }

    /// Ids of every module defined in this context, sorted
    pub fn module_ids(&self) -> Vec<String> {
        self.with_slot(|slot| slot.table.ids()).unwrap_or_default()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}
