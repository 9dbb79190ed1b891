//! Resource Loader Gateway
//!
//! Wraps the injected [`ResourceLoader`] capability. At most one physical
//! load runs per (scope, locator) key; every requester of that key is queued
//! and receives the single outcome in the order it asked. Outcomes are kept,
//! so later requesters get the replayed result without another load.
//! Failures are never retried; changing the locator (e.g. through a new
//! cache parameter) is the way to ask again.

use crate::error::RuntimeError;
use crate::module::{notify_all, WaitHandle, Waiter};
use crate::runtime::Runtime;
use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Scope shared by master files and package resources
pub const RUNTIME_SCOPE: &str = "*";

/// What a resource is requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Module,
    Shim,
    Master,
    Package,
    Script,
}

/// A request handed to the loading capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    /// Requesting context
    pub context: String,
    /// Locator without cache parameters (the dedup key)
    pub locator: String,
    /// Locator with cache parameters applied
    pub url: String,
    /// Module or package id the resource is expected to provide
    pub module_id: Option<String>,
    pub kind: ResourceKind,
}

impl ResourceRequest {
    pub fn key(&self) -> LoadKey {
        let scope = match self.kind {
            ResourceKind::Master | ResourceKind::Package => RUNTIME_SCOPE,
            _ => self.context.as_str(),
        };
        LoadKey::new(scope, &self.locator)
    }
}

/// Injected capability that fetches and runs an external resource.
///
/// The runtime is passed along so the resource can register definitions.
/// Must complete exactly once per call and tolerate repeated locators.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load_resource(&self, request: ResourceRequest, runtime: Runtime) -> Result<(), RuntimeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadKey {
    pub scope: String,
    pub locator: String,
}

impl LoadKey {
    pub fn new(scope: &str, locator: &str) -> Self {
        Self {
            scope: scope.to_string(),
            locator: locator.to_string(),
        }
    }
}

enum LoadState {
    Pending(Vec<Waiter<()>>),
    Loaded,
    Failed(RuntimeError),
}

pub(crate) enum LoadAdmission {
    Done(Result<(), RuntimeError>),
    Wait(WaitHandle<()>),
    Start(WaitHandle<()>),
}

/// Registry of load tasks, one per key
#[derive(Default)]
pub(crate) struct LoadRegistry {
    tasks: HashMap<LoadKey, LoadState>,
    order: Vec<LoadKey>,
}

impl LoadRegistry {
    pub(crate) fn admit(&mut self, key: &LoadKey) -> LoadAdmission {
        match self.tasks.get_mut(key) {
            Some(LoadState::Loaded) => LoadAdmission::Done(Ok(())),
            Some(LoadState::Failed(err)) => LoadAdmission::Done(Err(err.clone())),
            Some(LoadState::Pending(waiters)) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                LoadAdmission::Wait(rx)
            }
            None => {
                let (tx, rx) = oneshot::channel();
                self.tasks.insert(key.clone(), LoadState::Pending(vec![tx]));
                self.order.push(key.clone());
                LoadAdmission::Start(rx)
            }
        }
    }

    pub(crate) fn complete(&mut self, key: &LoadKey, outcome: &Result<(), RuntimeError>) -> Vec<Waiter<()>> {
        let next = match outcome {
            Ok(()) => LoadState::Loaded,
            Err(err) => LoadState::Failed(err.clone()),
        };
        match self.tasks.insert(key.clone(), next) {
            Some(LoadState::Pending(waiters)) => waiters,
            _ => Vec::new(),
        }
    }

    /// Requested locators grouped by scope, in request order
    pub(crate) fn scripts(&self) -> BTreeMap<String, Vec<String>> {
        let mut scripts: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for key in &self.order {
            scripts.entry(key.scope.clone()).or_default().push(key.locator.clone());
        }
        scripts
    }
}

/// Load a resource through the gateway, joining any in-flight load of the same key.
pub(crate) fn load(runtime: &Runtime, request: ResourceRequest) -> BoxFuture<'static, Result<(), RuntimeError>> {
    let key = request.key();
    let admission = runtime.state().loads.admit(&key);

    match admission {
        LoadAdmission::Done(outcome) => future::ready(outcome).boxed(),
        LoadAdmission::Wait(rx) => {
            debug!(locator = %key.locator, scope = %key.scope, "Joining in-flight load");
            wait(rx, key).boxed()
        }
        LoadAdmission::Start(rx) => {
            let runtime = runtime.clone();
            let task_key = key.clone();
            debug!(locator = %request.locator, url = %request.url, kind = ?request.kind, "Loading resource");
            // Spawned so that dropping a requester never cancels the physical load.
            tokio::spawn(async move {
                let loader = runtime.loader();
                let outcome = loader
                    .load_resource(request, runtime.clone())
                    .await
                    .map_err(|err| err.into_load_error(&task_key.locator));
                if let Err(err) = &outcome {
                    warn!(locator = %task_key.locator, error = %err, "Resource load failed");
                }
                let waiters = runtime.state().loads.complete(&task_key, &outcome);
                notify_all(waiters, &outcome);
            });
            wait(rx, key).boxed()
        }
    }
}

async fn wait(rx: WaitHandle<()>, key: LoadKey) -> Result<(), RuntimeError> {
    rx.await
        .unwrap_or_else(|_| Err(RuntimeError::Abandoned(format!("load of {}", key.locator))))
}

/// Script run when a [`ScriptedLoader`] resource loads
pub type Script = Arc<dyn Fn(&Runtime, &ResourceRequest) -> Result<(), String> + Send + Sync>;

/// In-memory loader: locators map to scripts run against the runtime.
///
/// Counts physical loads per locator, which makes dedup observable.
#[derive(Default)]
pub struct ScriptedLoader {
    scripts: RwLock<HashMap<String, Script>>,
    failures: RwLock<HashMap<String, String>>,
    delays: RwLock<HashMap<String, Duration>>,
    latency: Option<Duration>,
    lenient: bool,
    counts: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<ResourceRequest>>,
}

impl ScriptedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every load by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Treat unknown locators as empty resources instead of failures
    pub fn lenient(mut self) -> Self {
        self.lenient = true;
        self
    }

    pub fn script<F>(&self, locator: impl Into<String>, script: F)
    where
        F: Fn(&Runtime, &ResourceRequest) -> Result<(), String> + Send + Sync + 'static,
    {
        self.scripts.write().insert(locator.into(), Arc::new(script));
    }

    /// Register a resource that exists but does nothing when run
    pub fn empty(&self, locator: impl Into<String>) {
        self.script(locator, |_, _| Ok(()));
    }

    pub fn fail(&self, locator: impl Into<String>, reason: impl Into<String>) {
        self.failures.write().insert(locator.into(), reason.into());
    }

    pub fn delay(&self, locator: impl Into<String>, delay: Duration) {
        self.delays.write().insert(locator.into(), delay);
    }

    pub fn load_count(&self, locator: &str) -> usize {
        self.counts.lock().get(locator).copied().unwrap_or(0)
    }

    pub fn total_loads(&self) -> usize {
        self.counts.lock().values().sum()
    }

    pub fn requests(&self) -> Vec<ResourceRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ResourceLoader for ScriptedLoader {
    async fn load_resource(&self, request: ResourceRequest, runtime: Runtime) -> Result<(), RuntimeError> {
        *self.counts.lock().entry(request.locator.clone()).or_insert(0) += 1;
        self.requests.lock().push(request.clone());

        let delay = self.delays.read().get(&request.locator).copied().or(self.latency);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.read().get(&request.locator).cloned();
        if let Some(reason) = failure {
            return Err(RuntimeError::ResourceLoad {
                locator: request.locator.clone(),
                reason,
            });
        }

        let script = self.scripts.read().get(&request.locator).cloned();
        match script {
            Some(script) => script(&runtime, &request).map_err(|reason| RuntimeError::ResourceLoad {
                locator: request.locator.clone(),
                reason,
            }),
            None if self.lenient => Ok(()),
            None => Err(RuntimeError::ResourceLoad {
                locator: request.locator.clone(),
                reason: "resource not found".to_string(),
            }),
        }
    }
}
