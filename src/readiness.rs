//! Readiness Gate and one-time context initialization.
//!
//! Resolution requests of waiting contexts queue behind a runtime-wide latch
//! until the host signals readiness. Independently, each context runs its
//! initialization (master file, packages, pre-process hook) exactly once
//! before its first resolution proceeds.

use crate::cache::CacheHints;
use crate::config::PackageRef;
use crate::context::Context;
use crate::error::RuntimeError;
use crate::loader::{self, ResourceKind};
use crate::module::{notify_all, WaitHandle, Waiter};
use crate::registry::ContextSlot;
use crate::runtime::Runtime;
use futures::future::{self, BoxFuture, FutureExt};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Hook run at the end of a context's initialization
pub type PreProcess = Arc<dyn Fn(Context) -> BoxFuture<'static, Result<(), RuntimeError>> + Send + Sync>;

/// Listener wrapping the readiness trigger, e.g. to defer or batch it
pub type ExecuteListener = Arc<dyn Fn(ReadyTrigger) + Send + Sync>;

/// One-shot readiness latch with a FIFO queue of parked requests
#[derive(Default)]
pub(crate) struct ReadinessGate {
    ready: bool,
    queue: Vec<oneshot::Sender<()>>,
    listener: Option<ExecuteListener>,
}

impl ReadinessGate {
    pub(crate) fn is_ready(&self) -> bool {
        self.ready
    }

    /// Park a request unless the latch is already set.
    pub(crate) fn enter(&mut self) -> Option<oneshot::Receiver<()>> {
        if self.ready {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.queue.push(tx);
        Some(rx)
    }

    /// Set the latch and hand back the parked requests in arrival order.
    pub(crate) fn latch(&mut self) -> Vec<oneshot::Sender<()>> {
        self.ready = true;
        std::mem::take(&mut self.queue)
    }

    pub(crate) fn pending(&self) -> usize {
        self.queue.len()
    }

    /// First listener wins
    pub(crate) fn set_listener(&mut self, listener: ExecuteListener) -> bool {
        if self.listener.is_some() {
            return false;
        }
        self.listener = Some(listener);
        true
    }

    pub(crate) fn listener(&self) -> Option<ExecuteListener> {
        self.listener.clone()
    }
}

/// Fires the readiness latch; handed to the execute listener when one is set
pub struct ReadyTrigger {
    runtime: Runtime,
}

impl ReadyTrigger {
    pub(crate) fn new(runtime: Runtime) -> Self {
        Self { runtime }
    }

    pub fn fire(self) {
        let parked = self.runtime.state().gate.latch();
        debug!(parked = parked.len(), "Readiness latched");
        for tx in parked {
            let _ = tx.send(());
        }
    }
}

impl fmt::Debug for ReadyTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReadyTrigger")
    }
}

/// Wait for the readiness latch unless the context opts out.
pub(crate) fn wait_ready(runtime: &Runtime, wait: bool) -> BoxFuture<'static, ()> {
    if !wait {
        return future::ready(()).boxed();
    }
    match runtime.state().gate.enter() {
        None => future::ready(()).boxed(),
        Some(rx) => async move {
            // A dropped sender only happens when the runtime is gone; nothing left to wait for.
            let _ = rx.await;
        }
        .boxed(),
    }
}

/// Initialization state of one context
#[derive(Default)]
pub(crate) enum InitState {
    #[default]
    Uninitialized,
    Initializing(Vec<Waiter<()>>),
    Ready,
    Failed(RuntimeError),
}

pub(crate) enum InitAdmission {
    Done(Result<(), RuntimeError>),
    Wait(WaitHandle<()>),
    Start(WaitHandle<()>),
}

impl InitState {
    pub(crate) fn is_ready(&self) -> bool {
        matches!(self, InitState::Ready)
    }

    fn admit(&mut self) -> InitAdmission {
        match self {
            InitState::Ready => InitAdmission::Done(Ok(())),
            InitState::Failed(err) => InitAdmission::Done(Err(err.clone())),
            InitState::Initializing(waiters) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                InitAdmission::Wait(rx)
            }
            InitState::Uninitialized => {
                let (tx, rx) = oneshot::channel();
                *self = InitState::Initializing(vec![tx]);
                InitAdmission::Start(rx)
            }
        }
    }

    fn complete(&mut self, outcome: &Result<(), RuntimeError>) -> Vec<Waiter<()>> {
        let next = match outcome {
            Ok(()) => InitState::Ready,
            Err(err) => InitState::Failed(err.clone()),
        };
        match std::mem::replace(self, next) {
            InitState::Initializing(waiters) => waiters,
            _ => Vec::new(),
        }
    }
}

/// Mark a context with no master file, packages or hook as initialized in place.
pub(crate) fn settle_idle(slot: &mut ContextSlot) {
    let idle = slot.config.master_file.is_none() && slot.config.packages.is_empty() && slot.pre_process.is_none();
    if idle && matches!(slot.init, InitState::Uninitialized) {
        slot.init = InitState::Ready;
    }
}

/// Readiness latch then initialization. The latch is entered before returning.
pub(crate) fn prepare(context: &Context) -> BoxFuture<'static, Result<(), RuntimeError>> {
    let wait = match context.with_slot(|slot| slot.config.wait) {
        Ok(wait) => wait,
        Err(err) => return future::ready(Err(err)).boxed(),
    };
    let ready = wait_ready(context.runtime(), wait);
    let context = context.clone();
    async move {
        ready.await;
        ensure_initialized(&context).await
    }
    .boxed()
}

/// Run the context's initialization at most once; later callers join or replay it.
pub(crate) fn ensure_initialized(context: &Context) -> BoxFuture<'static, Result<(), RuntimeError>> {
    let admission = match context.with_slot(|slot| {
        settle_idle(slot);
        slot.init.admit()
    }) {
        Ok(admission) => admission,
        Err(err) => return future::ready(Err(err)).boxed(),
    };

    let rx = match admission {
        InitAdmission::Done(outcome) => return future::ready(outcome).boxed(),
        InitAdmission::Wait(rx) => rx,
        InitAdmission::Start(rx) => {
            let context = context.clone();
            tokio::spawn(async move {
                let outcome = initialize(&context).await;
                match &outcome {
                    Ok(()) => info!(context = %context.id(), "Context initialized"),
                    Err(err) => warn!(context = %context.id(), error = %err, "Context initialization failed"),
                }
                let waiters = context
                    .with_slot(|slot| slot.init.complete(&outcome))
                    .unwrap_or_default();
                notify_all(waiters, &outcome);
            });
            rx
        }
    };

    let id = context.id().to_string();
    async move {
        rx.await
            .unwrap_or_else(|_| Err(RuntimeError::Abandoned(format!("initialization of {}", id))))
    }
    .boxed()
}

async fn initialize(context: &Context) -> Result<(), RuntimeError> {
    let config = context.config()?;

    if let Some(master) = config.master_file.as_deref() {
        let locator = context.resource_path(master)?;
        context.runtime().record_master_file(&locator);
        info!(context = %context.id(), locator = %locator, "Loading master file");
        let request = context.request(locator, None, ResourceKind::Master, &CacheHints::default())?;
        loader::load(context.runtime(), request).await?;
    }

    load_packages(context, &config.packages).await?;

    if let Some(hook) = context.with_slot(|slot| slot.pre_process.clone())? {
        debug!(context = %context.id(), "Running pre-process hook");
        hook(context.clone()).await?;
    }

    Ok(())
}

/// Load package resources one after another, skipping packages whose context exists.
pub(crate) async fn load_packages(context: &Context, packages: &[PackageRef]) -> Result<(), RuntimeError> {
    if packages.is_empty() {
        return Ok(());
    }

    let entries = context.runtime().resolve_packages(packages)?;
    for (uid, src) in entries {
        if context.runtime().get_instance(&uid).is_some() {
            debug!(package = %uid, "Package context already instantiated");
            continue;
        }
        let locator = context.resource_path(&src)?;
        debug!(package = %uid, locator = %locator, "Loading package");
        let request = context.request(locator, Some(uid), ResourceKind::Package, &CacheHints::default())?;
        loader::load(context.runtime(), request).await?;
    }
    Ok(())
}
