//! Property tests for identifier normalization and classification

use super::support::{self, context};
use modlink::identifier::{classify, normalize, DependencySpec, PathAlias};
use modlink::ScriptedLoader;
use proptest::prelude::*;
use std::sync::Arc;

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,8}"
}

proptest! {
    #[test]
    fn prop_context_normalize_matches_free_function(
        raw in "/{0,2}[a-z]{1,4}(/{1,3}[a-z]{1,4}){0,3}",
    ) {
        let loader = Arc::new(ScriptedLoader::new());
        let runtime = support::runtime(&loader, vec![context("app").with_alias("lib/", "vendor/lib/")]);
        let app = runtime.context("app").unwrap();
        let aliases = vec![PathAlias::new("lib/", "vendor/lib/")];
        prop_assert_eq!(app.normalize(&raw).unwrap(), normalize(&raw, &aliases));
    }

    #[test]
    fn prop_alias_rewrites_only_first_occurrence(tail in segment()) {
        let aliases = vec![PathAlias::new("a/", "b/a/")];
        let raw = format!("a/a/{}", tail);
        prop_assert_eq!(normalize(&raw, &aliases), format!("b/a/a/{}", tail));
    }

    #[test]
    fn prop_qualified_ids_are_foreign(ctx in segment(), id in segment()) {
        let raw = format!("/{}:{}", ctx, id);
        let normalized = normalize(&raw, &[]);
        prop_assert_eq!(
            classify(&normalized),
            DependencySpec::Foreign { context: ctx, id }
        );
    }

    #[test]
    fn prop_plain_paths_are_local(parts in prop::collection::vec(segment(), 1..4)) {
        let raw = parts.join("//");
        let normalized = normalize(&raw, &[]);
        prop_assume!(!modlink::identifier::is_reserved(&normalized));
        prop_assert_eq!(classify(&normalized), DependencySpec::Local(parts.join("/")));
    }
}
