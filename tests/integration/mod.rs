//! Integration tests for the modlink dependency runtime

mod support;

mod cache_keys;
mod contexts;
mod normalize_properties;
mod readiness;
mod shims;
