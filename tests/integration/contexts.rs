//! Integration tests for isolated contexts and cross-context references

use super::support::{self, context, data, js};
use modlink::{ContextConfig, Factory, RuntimeError, ScriptedLoader, Value};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_contexts_are_isolated() {
    let loader = Arc::new(ScriptedLoader::new());
    let runtime = support::runtime(&loader, vec![context("one"), context("two")]);
    let one = runtime.context("one").unwrap();
    let two = runtime.context("two").unwrap();

    one.define("name", Vec::<String>::new(), Factory::value(Value::data("one")))
        .unwrap();
    two.define("name", Vec::<String>::new(), Factory::value(Value::data("two")))
        .unwrap();

    assert_eq!(data(&one.require(["name"]).await.unwrap()[0]), json!("one"));
    assert_eq!(data(&two.require(["name"]).await.unwrap()[0]), json!("two"));
}

#[tokio::test]
async fn test_instantiate_twice_returns_existing_context() {
    let loader = Arc::new(ScriptedLoader::new());
    let runtime = support::runtime(&loader, vec![context("app")]);

    let again = runtime
        .instantiate(ContextConfig::new("app").with_base_url("/elsewhere/"))
        .unwrap();
    assert_eq!(again.id(), "app");
    assert_eq!(again.module_path("x").unwrap(), js("x"));
}

#[tokio::test]
async fn test_definition_for_missing_context_is_flushed_on_instantiation() {
    let loader = Arc::new(ScriptedLoader::new());
    let runtime = support::runtime(&loader, vec![context("app")]);
    let app = runtime.context("app").unwrap();

    app.define("late:greeting", Vec::<String>::new(), Factory::value(Value::data("hello")))
        .unwrap();
    runtime
        .define_deferred("late", "farewell", vec!["greeting".to_string()], Factory::func(|args| {
            let greeting = args[0].as_data().and_then(|v| v.as_str()).unwrap_or("").to_string();
            Value::data(format!("{} and goodbye", greeting))
        }))
        .unwrap();
    assert_eq!(runtime.deferred_count("late"), 2);
    assert!(!app.is_defined("greeting"));

    let late = runtime.instantiate(context("late")).unwrap();
    assert_eq!(runtime.deferred_count("late"), 0);

    let values = late.require(["farewell"]).await.unwrap();
    assert_eq!(data(&values[0]), json!("hello and goodbye"));
}

#[tokio::test]
async fn test_foreign_reference_executes_in_target_context() {
    let loader = Arc::new(ScriptedLoader::new());
    let runtime = support::runtime(&loader, vec![context("app"), context("lib")]);
    let lib = runtime.context("lib").unwrap();
    lib.define("util", Vec::<String>::new(), Factory::value(Value::data("lib util")))
        .unwrap();

    let app = runtime.context("app").unwrap();
    let values = app.require(["lib:util"]).await.unwrap();
    assert_eq!(data(&values[0]), json!("lib util"));
    assert!(lib.require_sync("util").unwrap().is_some());
    assert!(app.require_sync("lib:util").unwrap().is_some());
}

#[tokio::test]
async fn test_foreign_reference_loads_through_target_context() {
    let loader = Arc::new(ScriptedLoader::new());
    loader.script("http://test.local/lib/util.js", |runtime, request| {
        assert_eq!(request.context, "lib");
        support::define_value(runtime, "lib", "util", Value::data("loaded util"))
    });
    let runtime = support::runtime(
        &loader,
        vec![
            context("app"),
            ContextConfig::new("lib").with_base_url("/lib/").no_wait(),
        ],
    );

    let app = runtime.context("app").unwrap();
    let values = app.require(["lib:util"]).await.unwrap();
    assert_eq!(data(&values[0]), json!("loaded util"));
    assert_eq!(loader.load_count("http://test.local/lib/util.js"), 1);
    assert_eq!(
        runtime.loaded_scripts().get("lib"),
        Some(&vec!["http://test.local/lib/util.js".to_string()])
    );
}

#[tokio::test]
async fn test_foreign_reference_to_unknown_context_is_null() {
    let loader = Arc::new(ScriptedLoader::new());
    let runtime = support::runtime(&loader, vec![context("app")]);
    let app = runtime.context("app").unwrap();

    let values = app.require(["ghost:thing", "getInstance:ghost"]).await.unwrap();
    assert!(values[0].is_null());
    assert!(values[1].is_null());
    assert_eq!(loader.total_loads(), 0);
}

#[tokio::test]
async fn test_foreign_module_never_defined_is_null() {
    let loader = Arc::new(ScriptedLoader::new());
    loader.empty(js("nothing"));
    let runtime = support::runtime(&loader, vec![context("app"), context("lib")]);
    let app = runtime.context("app").unwrap();

    let values = app.require(["lib:nothing"]).await.unwrap();
    assert!(values[0].is_null());
}

#[tokio::test]
async fn test_get_instance_reference() {
    let loader = Arc::new(ScriptedLoader::new());
    let runtime = support::runtime(&loader, vec![context("app"), context("lib")]);
    let app = runtime.context("app").unwrap();

    let values = app.require(["getInstance:lib"]).await.unwrap();
    let lib = values[0].as_context().expect("context handle");
    assert_eq!(lib.id(), "lib");
    assert_eq!(app.get_instance("lib").map(|c| c.id().to_string()), Some("lib".to_string()));
    assert!(app.get_instance("ghost").is_none());
    assert!(matches!(
        app.require_sync("getInstance:ghost"),
        Err(RuntimeError::UnknownContext(_))
    ));
}

#[tokio::test]
async fn test_aliases_apply_before_lookup() {
    let loader = Arc::new(ScriptedLoader::new());
    loader.script(js("vendor/jquery/core"), |runtime, request| {
        assert_eq!(request.module_id.as_deref(), Some("vendor/jquery/core"));
        support::define_value(runtime, "app", "vendor/jquery/core", Value::data("$"))
    });
    let runtime = support::runtime(
        &loader,
        vec![context("app").with_alias("jq/", "vendor/jquery/")],
    );
    let app = runtime.context("app").unwrap();

    let values = app.require(["/jq//core"]).await.unwrap();
    assert_eq!(data(&values[0]), json!("$"));
    assert!(app.require_sync("jq/core").unwrap().is_some());
}

#[tokio::test]
async fn test_foreign_reference_resolves_once_context_exists() {
    let loader = Arc::new(ScriptedLoader::new());
    let runtime = support::runtime(&loader, vec![context("app")]);
    let app = runtime.context("app").unwrap();

    let before = app.require(["other:modA"]).await.unwrap();
    assert!(before[0].is_null());

    app.define("other:modA", Vec::<String>::new(), Factory::value(Value::data("A")))
        .unwrap();
    runtime.instantiate(context("other")).unwrap();

    let after = app.require(["other:modA"]).await.unwrap();
    assert_eq!(data(&after[0]), json!("A"));
}
