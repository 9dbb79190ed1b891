//! Shared fixtures: a runtime on a fixed page location backed by a ScriptedLoader.

use modlink::{ContextConfig, Factory, GlobalScope, Runtime, RuntimeConfig, ScriptedLoader, Value};
use std::sync::Arc;

pub const LOCATION: &str = "http://test.local/app/index.html";

/// Locator of a module of a context whose base url is `/js/`
pub fn js(id: &str) -> String {
    format!("http://test.local/js/{}.js", id)
}

/// Context `id` resolving modules under `/js/`, not waiting for readiness
pub fn context(id: &str) -> ContextConfig {
    ContextConfig::new(id).with_base_url("/js/").no_wait()
}

pub fn runtime(loader: &Arc<ScriptedLoader>, contexts: Vec<ContextConfig>) -> Runtime {
    runtime_with(loader, contexts, |config| config)
}

pub fn runtime_with<F>(loader: &Arc<ScriptedLoader>, contexts: Vec<ContextConfig>, adjust: F) -> Runtime
where
    F: FnOnce(RuntimeConfig) -> RuntimeConfig,
{
    let config = adjust(RuntimeConfig {
        location: LOCATION.to_string(),
        contexts,
        ..RuntimeConfig::default()
    });
    Runtime::new(&config, loader.clone()).unwrap()
}

pub fn runtime_with_globals(
    loader: &Arc<ScriptedLoader>,
    globals: &Arc<GlobalScope>,
    contexts: Vec<ContextConfig>,
) -> Runtime {
    let config = RuntimeConfig {
        location: LOCATION.to_string(),
        contexts,
        ..RuntimeConfig::default()
    };
    Runtime::with_globals(&config, loader.clone(), globals.clone()).unwrap()
}

/// Script body defining `id` in `context` with a constant value
pub fn define_value(runtime: &Runtime, context: &str, id: &str, value: Value) -> Result<(), String> {
    runtime
        .context(context)
        .and_then(|ctx| ctx.define(id, Vec::<String>::new(), Factory::value(value)))
        .map_err(|e| e.to_string())
}

pub fn data(value: &Value) -> serde_json::Value {
    value.as_data().cloned().unwrap_or(serde_json::Value::Null)
}
