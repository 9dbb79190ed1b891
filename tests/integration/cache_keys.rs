//! Integration tests for cache-busting of requested locators

use super::support::{self, context, js};
use modlink::{CacheCondition, ResourceRequest, ScriptedLoader};
use std::sync::Arc;

fn url_of(requests: &[ResourceRequest], locator: &str) -> String {
    requests
        .iter()
        .find(|r| r.locator == locator)
        .map(|r| r.url.clone())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_global_param_is_used_verbatim() {
    let loader = Arc::new(ScriptedLoader::new().lenient());
    let runtime = support::runtime_with(&loader, vec![context("app")], |mut config| {
        config.cache.param = Some("build-42".to_string());
        config
    });
    assert_eq!(runtime.global_cache_param().as_deref(), Some("build-42"));

    runtime.context("app").unwrap().require(["a"]).await.unwrap();
    assert_eq!(url_of(&loader.requests(), &js("a")), format!("{}?v=build-42", js("a")));
}

#[tokio::test]
async fn test_context_param_name() {
    let loader = Arc::new(ScriptedLoader::new().lenient());
    let runtime = support::runtime(&loader, vec![context("app").with_cache_param("rev")]);
    runtime.set_global_cache_param("7");

    runtime.context("app").unwrap().require(["a"]).await.unwrap();
    assert_eq!(url_of(&loader.requests(), &js("a")), format!("{}?rev=7", js("a")));
}

#[tokio::test]
async fn test_first_matching_condition_wins() {
    let loader = Arc::new(ScriptedLoader::new().lenient());
    let runtime = support::runtime(&loader, vec![context("app")]);
    runtime.set_global_cache_param("1");
    runtime.set_global_cache_cond([
        CacheCondition::new(r"/js/live").unwrap().no_store(),
        CacheCondition::new(r"/js/").unwrap().with_param("stamp"),
    ]);

    let app = runtime.context("app").unwrap();
    app.require(["live", "static"]).await.unwrap();
    let requests = loader.requests();

    let live = url_of(&requests, &js("live"));
    let token = live
        .strip_prefix(&format!("{}?v=", js("live")))
        .expect("no-store url keeps default param name");
    assert_eq!(token.len(), 13);
    assert!(token.chars().all(|c| c.is_ascii_digit()));

    assert_eq!(url_of(&requests, &js("static")), format!("{}?stamp=1", js("static")));
}

#[tokio::test]
async fn test_dedup_key_ignores_cache_parameters() {
    let loader = Arc::new(ScriptedLoader::new().lenient());
    let runtime = support::runtime(&loader, vec![context("app")]);
    runtime.set_global_cache_cond([CacheCondition::new("x").unwrap().no_store()]);
    let app = runtime.context("app").unwrap();

    app.require(["x"]).await.unwrap();
    app.require(["x"]).await.unwrap();
    assert_eq!(loader.load_count(&js("x")), 1);
}
