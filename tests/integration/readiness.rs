//! Integration tests for the readiness gate and context initialization

use super::support::{self, context, data, js};
use modlink::{ContextConfig, Factory, PackageRef, ReadyTrigger, RuntimeError, ScriptedLoader, Value};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn waiting(id: &str) -> ContextConfig {
    ContextConfig::new(id).with_base_url("/js/")
}

#[tokio::test]
async fn test_requests_park_until_ready() {
    let loader = Arc::new(ScriptedLoader::new());
    let runtime = support::runtime(&loader, vec![waiting("app")]);
    let app = runtime.context("app").unwrap();
    app.define("a", Vec::<String>::new(), Factory::value(Value::data("a")))
        .unwrap();

    let first = tokio::spawn(app.require(["a"]));
    let second = tokio::spawn(app.require(["a"]));
    assert_eq!(runtime.pending_requests(), 2);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!first.is_finished());
    assert!(!runtime.is_ready());

    runtime.set_ready();
    assert_eq!(runtime.pending_requests(), 0);
    assert_eq!(data(&first.await.unwrap().unwrap()[0]), json!("a"));
    assert_eq!(data(&second.await.unwrap().unwrap()[0]), json!("a"));

    // Once latched, requests go straight through
    assert!(app.require(["a"]).now_or_never().is_some());
}

#[tokio::test]
async fn test_no_wait_context_bypasses_gate() {
    let loader = Arc::new(ScriptedLoader::new());
    let runtime = support::runtime(&loader, vec![waiting("app"), context("eager")]);
    let eager = runtime.context("eager").unwrap();
    eager
        .define("x", Vec::<String>::new(), Factory::value(Value::data(1)))
        .unwrap();

    let values = tokio::time::timeout(Duration::from_secs(1), eager.require(["x"]))
        .await
        .expect("no-wait context must not park")
        .unwrap();
    assert_eq!(data(&values[0]), json!(1));
    assert!(!runtime.is_ready());
}

#[tokio::test]
async fn test_execute_listener_controls_trigger() {
    let loader = Arc::new(ScriptedLoader::new());
    let runtime = support::runtime(&loader, vec![waiting("app")]);
    let held: Arc<Mutex<Option<ReadyTrigger>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&held);
    assert!(runtime.set_execute_listener(move |trigger| {
        *slot.lock() = Some(trigger);
    }));
    assert!(!runtime.set_execute_listener(|trigger: ReadyTrigger| trigger.fire()));

    let app = runtime.context("app").unwrap();
    app.define("a", Vec::<String>::new(), Factory::value(Value::data("a")))
        .unwrap();
    let pending = tokio::spawn(app.require(["a"]));

    runtime.set_ready();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!pending.is_finished());

    let trigger = held.lock().take().expect("listener received trigger");
    trigger.fire();
    assert!(pending.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_master_file_loads_once_before_resolution() {
    let loader = Arc::new(ScriptedLoader::new());
    loader.script("http://test.local/master.js", |runtime, request| {
        assert!(request.module_id.is_none());
        support::define_value(runtime, "app", "base", Value::data("from master"))
    });
    let runtime = support::runtime(&loader, vec![context("app").with_master_file("/master.js")]);
    let app = runtime.context("app").unwrap();

    let (first, second) = tokio::join!(app.require(["base"]), app.require(["base"]));
    assert_eq!(data(&first.unwrap()[0]), json!("from master"));
    assert!(second.is_ok());
    assert!(app.is_initialized());

    assert_eq!(loader.load_count("http://test.local/master.js"), 1);
    assert_eq!(loader.load_count(&js("base")), 0);
    assert_eq!(
        runtime.package_list_info().master,
        vec!["http://test.local/master.js".to_string()]
    );
    assert_eq!(
        runtime.loaded_scripts().get("*"),
        Some(&vec!["http://test.local/master.js".to_string()])
    );
}

#[tokio::test]
async fn test_packages_load_before_resolution() {
    let loader = Arc::new(ScriptedLoader::new());
    loader.script("http://test.local/pkg/ui.js", |runtime, request| {
        assert_eq!(request.module_id.as_deref(), Some("ui"));
        let ui = runtime
            .instantiate(ContextConfig::new("ui").no_wait())
            .map_err(|e| e.to_string())?;
        ui.define("button", Vec::<String>::new(), Factory::value(Value::data("button")))
            .map_err(|e| e.to_string())
    });
    let runtime = support::runtime_with(
        &loader,
        vec![context("app").with_package(PackageRef::Named("ui".into()))],
        |mut config| {
            config
                .packages
                .insert("ui".to_string(), "/pkg/ui.js".to_string());
            config
        },
    );
    let app = runtime.context("app").unwrap();

    let values = app.require(["ui:button"]).await.unwrap();
    assert_eq!(data(&values[0]), json!("button"));
    assert_eq!(loader.load_count("http://test.local/pkg/ui.js"), 1);

    // Loading the package again is a no-op once its context exists
    app.load_package(vec![PackageRef::Named("ui".into())])
        .await
        .unwrap();
    assert_eq!(loader.load_count("http://test.local/pkg/ui.js"), 1);
}

#[tokio::test]
async fn test_inline_packages_join_package_list() {
    let loader = Arc::new(ScriptedLoader::new());
    loader.empty("http://test.local/pkg/grid.js");
    let runtime = support::runtime(&loader, vec![context("app")]);
    let app = runtime.context("app").unwrap();

    let inline = BTreeMap::from([("grid".to_string(), "/pkg/grid.js".to_string())]);
    app.load_package(vec![PackageRef::Inline(inline)])
        .await
        .unwrap();

    let info = runtime.package_list_info();
    assert_eq!(info.instances.get("grid").map(String::as_str), Some("/pkg/grid.js"));
    assert_eq!(loader.load_count("http://test.local/pkg/grid.js"), 1);
}

#[tokio::test]
async fn test_unknown_package_fails_initialization() {
    let loader = Arc::new(ScriptedLoader::new());
    let runtime = support::runtime(
        &loader,
        vec![context("app").with_package(PackageRef::Named("missing".into()))],
    );
    let app = runtime.context("app").unwrap();
    app.define("a", Vec::<String>::new(), Factory::value(Value::Null))
        .unwrap();

    let expected = RuntimeError::PackageNotFound("missing".to_string());
    assert_eq!(app.require(["a"]).await.unwrap_err(), expected);
    // The failed initialization is replayed
    assert_eq!(app.require(["a"]).await.unwrap_err(), expected);
}

#[tokio::test]
async fn test_pre_process_hook_runs_before_resolution() {
    let loader = Arc::new(ScriptedLoader::new());
    let runtime = support::runtime(&loader, vec![context("app")]);
    let app = runtime.context("app").unwrap();
    app.set_pre_process(|ctx| {
        async move {
            ctx.define("injected", Vec::<String>::new(), Factory::value(Value::data("hook")))
        }
        .boxed()
    })
    .unwrap();

    let values = app.require(["injected"]).await.unwrap();
    assert_eq!(data(&values[0]), json!("hook"));
    assert_eq!(loader.total_loads(), 0);
}

#[tokio::test]
async fn test_load_script_is_deduplicated() {
    let loader = Arc::new(ScriptedLoader::new());
    loader.empty("http://test.local/analytics.js");
    let runtime = support::runtime(&loader, vec![context("app")]);
    let app = runtime.context("app").unwrap();

    let (a, b) = tokio::join!(app.load_script("/analytics.js"), app.load_script("analytics.js"));
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(loader.load_count("http://test.local/analytics.js"), 1);
}
