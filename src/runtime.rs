//! Runtime root
//!
//! One [`Runtime`] owns every piece of shared state: the context registry,
//! the load registry, the readiness gate, the cache policy and the package
//! list. The state sits behind a single mutex that is only held for
//! synchronous bookkeeping, never across an await or a factory call.

use crate::cache::{CacheCondition, CachePolicy};
use crate::config::{ContextConfig, PackageRef, RuntimeConfig};
use crate::context::Context;
use crate::error::RuntimeError;
use crate::identifier::{validate_context_id, validate_module_id};
use crate::loader::{LoadRegistry, ResourceLoader};
use crate::module::{Factory, ModuleKey};
use crate::paths::Location;
use crate::readiness::{ExecuteListener, ReadinessGate, ReadyTrigger};
use crate::registry::{ContextRegistry, ContextSlot, DeferredDefinition};
use crate::resolver::WaitGraph;
use crate::shim::{GlobalScope, HostGlobals, ShimProvider};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared mutable state of a runtime
#[derive(Default)]
pub(crate) struct RuntimeState {
    pub(crate) registry: ContextRegistry,
    pub(crate) loads: LoadRegistry,
    pub(crate) gate: ReadinessGate,
    pub(crate) cache: CachePolicy,
    /// Package id to source path
    pub(crate) packages: BTreeMap<String, String>,
    pub(crate) master_files: Vec<String>,
    pub(crate) waits: WaitGraph,
    pub(crate) shim_providers: HashMap<ModuleKey, ShimProvider>,
}

struct RuntimeInner {
    state: Mutex<RuntimeState>,
    loader: Arc<dyn ResourceLoader>,
    globals: Arc<dyn HostGlobals>,
    location: Location,
}

/// Master files and package list known to the runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageListInfo {
    pub master: Vec<String>,
    pub instances: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Build a runtime with an empty in-memory global namespace.
    pub fn new(config: &RuntimeConfig, loader: Arc<dyn ResourceLoader>) -> Result<Self, RuntimeError> {
        Self::with_globals(config, loader, GlobalScope::shared())
    }

    /// Build a runtime and instantiate every configured context, in order.
    pub fn with_globals(
        config: &RuntimeConfig,
        loader: Arc<dyn ResourceLoader>,
        globals: Arc<dyn HostGlobals>,
    ) -> Result<Self, RuntimeError> {
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            RuntimeError::ConfigError(messages.join("; "))
        })?;

        let location = Location::parse(&config.location)?;
        let mut state = RuntimeState::default();
        if let Some(param) = config.cache.param.as_deref() {
            state.cache.set_global_param(param);
        }
        state.cache.add_conditions(config.cache.compile()?);
        state.packages = config.packages.clone();

        let runtime = Self {
            inner: Arc::new(RuntimeInner {
                state: Mutex::new(state),
                loader,
                globals,
                location,
            }),
        };

        for context in &config.contexts {
            runtime.instantiate(context.clone())?;
        }
        info!(
            location = %config.location,
            contexts = config.contexts.len(),
            "Runtime created"
        );
        Ok(runtime)
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, RuntimeState> {
        self.inner.state.lock()
    }

    pub(crate) fn loader(&self) -> Arc<dyn ResourceLoader> {
        Arc::clone(&self.inner.loader)
    }

    pub(crate) fn globals(&self) -> Arc<dyn HostGlobals> {
        Arc::clone(&self.inner.globals)
    }

    pub fn location(&self) -> &Location {
        &self.inner.location
    }

    /// Register a context. An existing id is returned as-is; its configuration is not updated.
    pub fn instantiate(&self, config: ContextConfig) -> Result<Context, RuntimeError> {
        validate_context_id(&config.context)?;
        config.validate().map_err(RuntimeError::ConfigError)?;

        let id = config.context.clone();
        let mut state = self.state();
        if state.registry.contains(&id) {
            warn!(context = %id, "Context already instantiated, keeping existing configuration");
            return Ok(Context::new(&id, self.clone()));
        }

        let slot = ContextSlot::new(config, &self.inner.location);
        debug!(context = %id, base_path = %slot.base_path, "Instantiating context");
        state.registry.insert(&id, slot);
        drop(state);

        info!(context = %id, "Context instantiated");
        Ok(Context::new(&id, self.clone()))
    }

    /// Handle for an instantiated context
    pub fn context(&self, id: &str) -> Result<Context, RuntimeError> {
        self.get_instance(id)
            .ok_or_else(|| RuntimeError::UnknownContext(id.to_string()))
    }

    pub fn get_instance(&self, id: &str) -> Option<Context> {
        if self.state().registry.contains(id) {
            Some(Context::new(id, self.clone()))
        } else {
            None
        }
    }

    pub fn context_ids(&self) -> Vec<String> {
        self.state().registry.context_ids()
    }

    /// Define `id` in `context`, or queue it until that context is instantiated.
    pub fn define_deferred(
        &self,
        context: &str,
        id: &str,
        deps: Vec<String>,
        factory: Factory,
    ) -> Result<(), RuntimeError> {
        validate_context_id(context)?;
        validate_module_id(id)?;

        if let Some(target) = self.get_instance(context) {
            return target.define(id, deps, factory);
        }

        self.state().registry.defer(
            context,
            DeferredDefinition {
                id: id.to_string(),
                deps,
                factory,
            },
        );
        Ok(())
    }

    /// Number of definitions queued for a context that does not exist yet
    pub fn deferred_count(&self, context: &str) -> usize {
        self.state().registry.deferred_count(context)
    }

    /// Replace the export provider of a shim
    pub fn set_shim_provider(&self, context: &str, id: &str, provider: ShimProvider) {
        self.state()
            .shim_providers
            .insert(ModuleKey::new(context, id), provider);
    }

    pub(crate) fn shim_provider(&self, key: &ModuleKey) -> Option<ShimProvider> {
        self.state().shim_providers.get(key).cloned()
    }

    /// Merge package entries into the runtime package list; later entries win.
    pub fn load_package_list(&self, packages: BTreeMap<String, String>) {
        let count = packages.len();
        self.state().packages.extend(packages);
        debug!(count, "Package list updated");
    }

    pub fn package_list_info(&self) -> PackageListInfo {
        let state = self.state();
        PackageListInfo {
            master: state.master_files.clone(),
            instances: state.packages.clone(),
        }
    }

    pub(crate) fn record_master_file(&self, locator: &str) {
        let mut state = self.state();
        if !state.master_files.iter().any(|known| known == locator) {
            state.master_files.push(locator.to_string());
        }
    }

    /// Expand package references to `(id, src)` pairs; inline maps join the package list.
    pub(crate) fn resolve_packages(&self, packages: &[PackageRef]) -> Result<Vec<(String, String)>, RuntimeError> {
        let mut state = self.state();
        let mut entries = Vec::new();
        for package in packages {
            match package {
                PackageRef::Named(name) => {
                    let src = state
                        .packages
                        .get(name)
                        .cloned()
                        .ok_or_else(|| RuntimeError::PackageNotFound(name.clone()))?;
                    entries.push((name.clone(), src));
                }
                PackageRef::Inline(map) => {
                    for (uid, src) in map {
                        state.packages.insert(uid.clone(), src.clone());
                        entries.push((uid.clone(), src.clone()));
                    }
                }
            }
        }
        Ok(entries)
    }

    pub fn set_global_cache_param(&self, param: impl Into<String>) {
        self.state().cache.set_global_param(param);
    }

    pub fn global_cache_param(&self) -> Option<String> {
        self.state().cache.global_param().map(str::to_string)
    }

    /// Append cache conditions; earlier conditions keep priority.
    pub fn set_global_cache_cond(&self, conditions: impl IntoIterator<Item = CacheCondition>) {
        self.state().cache.add_conditions(conditions);
    }

    /// Install the listener that receives the readiness trigger. First listener wins.
    pub fn set_execute_listener<F>(&self, listener: F) -> bool
    where
        F: Fn(ReadyTrigger) + Send + Sync + 'static,
    {
        let listener: ExecuteListener = Arc::new(listener);
        let installed = self.state().gate.set_listener(listener);
        if !installed {
            warn!("Execute listener already set, ignoring");
        }
        installed
    }

    /// Signal readiness, through the execute listener when one is installed.
    pub fn set_ready(&self) {
        let listener = self.state().gate.listener();
        let trigger = ReadyTrigger::new(self.clone());
        match listener {
            Some(listener) => listener(trigger),
            None => trigger.fire(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state().gate.is_ready()
    }

    /// Requests parked behind the readiness latch
    pub fn pending_requests(&self) -> usize {
        self.state().gate.pending()
    }

    /// Requested locators grouped by context, `*` for runtime-wide resources
    pub fn loaded_scripts(&self) -> BTreeMap<String, Vec<String>> {
        self.state().loads.scripts()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("location", &self.inner.location)
            .field("contexts", &self.context_ids())
            .finish()
    }
}
