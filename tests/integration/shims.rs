//! Integration tests for shimmed legacy resources

use super::support::{self, data};
use modlink::{ContextConfig, GlobalScope, HostGlobals, RuntimeError, ScriptedLoader, ShimDeclaration, Value};
use serde_json::json;
use std::sync::Arc;

const JQUERY: &str = "http://test.local/vendor/jquery.js";
const PLUGIN: &str = "http://test.local/vendor/plugin.js";

fn app_with_shims() -> ContextConfig {
    ContextConfig::new("app")
        .with_base_url("/js/")
        .no_wait()
        .with_shim(ShimDeclaration::new("jquery", "/vendor/jquery.js", "jQuery"))
        .with_shim(
            ShimDeclaration::new("plugin", "/vendor/plugin.js", "jQuery.fn.plugin").with_deps(["jquery"]),
        )
}

#[tokio::test]
async fn test_present_export_skips_load() {
    let loader = Arc::new(ScriptedLoader::new());
    let globals = GlobalScope::shared();
    globals.set("jQuery", Value::data(json!({ "version": "3.7" })));
    let runtime = support::runtime_with_globals(&loader, &globals, vec![app_with_shims()]);
    let app = runtime.context("app").unwrap();

    let values = app.require(["jquery"]).await.unwrap();
    assert_eq!(data(&values[0])["version"], json!("3.7"));
    assert_eq!(loader.total_loads(), 0);
}

#[tokio::test]
async fn test_shim_loads_source_then_reads_export() {
    let loader = Arc::new(ScriptedLoader::new());
    let globals = GlobalScope::shared();
    let scope = Arc::clone(&globals);
    loader.script(JQUERY, move |_, request| {
        assert!(request.url.starts_with(JQUERY));
        scope.set("jQuery", Value::data(json!({ "fn": {} })));
        Ok(())
    });
    let scope = Arc::clone(&globals);
    loader.script(PLUGIN, move |_, _| {
        // The plugin needs jQuery already present
        if scope.remove("jQuery").is_none() {
            return Err("jQuery missing".to_string());
        }
        scope.set("jQuery", Value::data(json!({ "fn": { "plugin": "installed" } })));
        Ok(())
    });
    let runtime = support::runtime_with_globals(&loader, &globals, vec![app_with_shims()]);
    let app = runtime.context("app").unwrap();

    let values = app.require(["plugin"]).await.unwrap();
    assert_eq!(data(&values[0]), json!("installed"));

    let order: Vec<String> = loader.requests().into_iter().map(|r| r.locator).collect();
    assert_eq!(order, vec![JQUERY.to_string(), PLUGIN.to_string()]);
    assert!(app.require_sync("jquery").unwrap().is_some());
}

#[tokio::test]
async fn test_missing_export_fails_every_requester() {
    let loader = Arc::new(ScriptedLoader::new());
    loader.empty(JQUERY);
    let runtime = support::runtime(&loader, vec![app_with_shims()]);
    let app = runtime.context("app").unwrap();

    let expected = RuntimeError::ShimExportMissing {
        id: "jquery".to_string(),
        export: "jQuery".to_string(),
    };
    let (first, second) = tokio::join!(app.require(["jquery"]), app.require(["jquery"]));
    assert_eq!(first.unwrap_err(), expected);
    assert_eq!(second.unwrap_err(), expected);
    assert_eq!(loader.load_count(JQUERY), 1);
}

#[tokio::test]
async fn test_shim_load_failure_surfaces_load_error() {
    let loader = Arc::new(ScriptedLoader::new());
    loader.fail(JQUERY, "offline");
    let runtime = support::runtime(&loader, vec![app_with_shims()]);
    let app = runtime.context("app").unwrap();

    let err = app.require(["plugin"]).await.unwrap_err();
    assert_eq!(
        err,
        RuntimeError::ResourceLoad {
            locator: JQUERY.to_string(),
            reason: "offline".to_string(),
        }
    );
    assert_eq!(loader.load_count(PLUGIN), 0);
}

#[tokio::test]
async fn test_custom_shim_provider() {
    let loader = Arc::new(ScriptedLoader::new());
    let runtime = support::runtime(&loader, vec![app_with_shims()]);
    runtime.set_shim_provider("app", "jquery", Arc::new(|_: &dyn HostGlobals| Some(Value::data("provided"))));
    let app = runtime.context("app").unwrap();

    let values = app.require(["jquery"]).await.unwrap();
    assert_eq!(data(&values[0]), json!("provided"));
    assert_eq!(loader.total_loads(), 0);
}

#[tokio::test]
async fn test_shim_cache_hints_shape_url() {
    let loader = Arc::new(ScriptedLoader::new());
    let globals = GlobalScope::shared();
    let scope = Arc::clone(&globals);
    loader.script("http://cdn.test/legacy.js", move |_, _| {
        scope.set("Legacy", Value::data(true));
        Ok(())
    });
    let mut shim = ShimDeclaration::new("legacy", "//cdn.test/legacy.js", "Legacy");
    shim.cache.no_cache_string = true;
    let config = ContextConfig::new("app").no_wait().with_shim(shim);
    let runtime = support::runtime_with_globals(&loader, &globals, vec![config]);

    runtime.context("app").unwrap().require(["legacy"]).await.unwrap();
    let requests = loader.requests();
    assert_eq!(requests[0].url, "http://cdn.test/legacy.js");
}
