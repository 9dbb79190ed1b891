//! Cache key policy
//!
//! Decides which cache-busting query parameter is appended to a resource
//! locator. The outcome depends only on the locator, the per-request hints,
//! the runtime-wide cache parameter and the current time.

use crate::error::RuntimeError;
use chrono::{DateTime, Datelike, Timelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Parameter name used when nothing more specific is configured
pub const DEFAULT_CACHE_PARAM: &str = "v";

/// Serializable form of a cache condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRule {
    pub pattern: String,
    #[serde(default)]
    pub no_store: bool,
    #[serde(default)]
    pub param: Option<String>,
}

/// Pattern → policy rule; the first matching rule wins
#[derive(Debug, Clone)]
pub struct CacheCondition {
    pattern: Regex,
    pub no_store: bool,
    pub param: Option<String>,
}

impl CacheCondition {
    pub fn new(pattern: &str) -> Result<Self, RuntimeError> {
        let pattern = Regex::new(pattern).map_err(|e| {
            RuntimeError::ConfigError(format!("Invalid cache condition pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            pattern,
            no_store: false,
            param: None,
        })
    }

    pub fn no_store(mut self) -> Self {
        self.no_store = true;
        self
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    pub fn matches(&self, locator: &str) -> bool {
        self.pattern.is_match(locator)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl TryFrom<&CacheRule> for CacheCondition {
    type Error = RuntimeError;

    fn try_from(rule: &CacheRule) -> Result<Self, Self::Error> {
        let mut cond = CacheCondition::new(&rule.pattern)?;
        cond.no_store = rule.no_store;
        cond.param = rule.param.clone();
        Ok(cond)
    }
}

/// Per-request cache hints (declared on shims)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHints {
    #[serde(default)]
    pub no_store: bool,
    #[serde(default)]
    pub query_param: Option<String>,
    /// Opt out of cache parameters entirely, unless a condition forces no-store
    #[serde(default)]
    pub no_cache_string: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CachePolicy {
    global_param: Option<String>,
    conditions: Vec<CacheCondition>,
}

impl CachePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_global_param(&mut self, param: impl Into<String>) {
        self.global_param = Some(param.into());
    }

    pub fn global_param(&self) -> Option<&str> {
        self.global_param.as_deref()
    }

    /// Append conditions after the existing ones
    pub fn add_conditions(&mut self, conditions: impl IntoIterator<Item = CacheCondition>) {
        self.conditions.extend(conditions);
    }

    pub fn conditions(&self) -> &[CacheCondition] {
        &self.conditions
    }

    pub fn find(&self, locator: &str) -> Option<&CacheCondition> {
        self.conditions.iter().find(|cond| cond.matches(locator))
    }

    pub fn apply(&self, locator: &str, hints: &CacheHints, context_param: Option<&str>) -> String {
        self.apply_at(locator, hints, context_param, Utc::now())
    }

    /// Cache-busted locator at a given instant.
    pub fn apply_at(
        &self,
        locator: &str,
        hints: &CacheHints,
        context_param: Option<&str>,
        now: DateTime<Utc>,
    ) -> String {
        let cond = self.find(locator);
        let no_store = match cond {
            Some(c) if c.no_store => true,
            _ => hints.no_store && !hints.no_cache_string,
        };

        if !no_store && hints.no_cache_string {
            return locator.to_string();
        }

        let name = cond
            .and_then(|c| c.param.as_deref())
            .or(hints.query_param.as_deref())
            .or(context_param)
            .unwrap_or(DEFAULT_CACHE_PARAM);

        let token = if no_store {
            now.timestamp_millis().to_string()
        } else if let Some(global) = &self.global_param {
            global.clone()
        } else {
            minute_token(now)
        };

        append_query(locator, name, &token)
    }
}

/// Half-minute granularity token: `YYYYMDHMin` followed by `30` or `1`.
pub fn minute_token(now: DateTime<Utc>) -> String {
    let half = if now.second() <= 30 { 30 } else { 1 };
    format!(
        "{}{}{}{}{}{}",
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        half
    )
}

fn append_query(locator: &str, name: &str, token: &str) -> String {
    let separator = if locator.contains('?') { '&' } else { '?' };
    if name.is_empty() {
        format!("{}{}{}", locator, separator, token)
    } else {
        format!("{}{}{}={}", locator, separator, name, token)
    }
}
