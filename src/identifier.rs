//! Identifier normalization and classification.

use crate::error::RuntimeError;
use serde::{Deserialize, Serialize};

pub const REQUIRE: &str = "require";
pub const DEFINE: &str = "define";
pub const EXPORTS: &str = "exports";

/// Prefix of the `getInstance:<ctx>` reserved form
pub const GET_INSTANCE: &str = "getInstance";

/// Literal substring substitution applied to identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathAlias {
    pub from: String,
    pub to: String,
}

impl PathAlias {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Reserved identifiers resolved to context capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reserved {
    Require,
    Define,
    Exports,
}

/// What a dependency identifier denotes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySpec {
    Reserved(Reserved),
    /// `ctx:id`, a module of another context
    Foreign { context: String, id: String },
    /// `getInstance:ctx`, the context handle itself
    Instance { context: String },
    /// Module, shim or external resource of the current context
    Local(String),
}

/// Apply aliases in declaration order, collapse duplicate separators and
/// strip one leading separator.
pub fn normalize(raw: &str, aliases: &[PathAlias]) -> String {
    let mut id = raw.to_string();
    for alias in aliases {
        if !alias.from.is_empty() {
            id = id.replacen(&alias.from, &alias.to, 1);
        }
    }

    let mut collapsed = String::with_capacity(id.len());
    let mut previous_slash = false;
    for ch in id.chars() {
        if ch == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        collapsed.push(ch);
    }

    match collapsed.strip_prefix('/') {
        Some(rest) => rest.to_string(),
        None => collapsed,
    }
}

/// Classify an already-normalized identifier.
pub fn classify(id: &str) -> DependencySpec {
    match id {
        REQUIRE => return DependencySpec::Reserved(Reserved::Require),
        DEFINE => return DependencySpec::Reserved(Reserved::Define),
        EXPORTS => return DependencySpec::Reserved(Reserved::Exports),
        _ => {}
    }

    if let Some((context, rest)) = split_reference(id) {
        if context == GET_INSTANCE {
            return DependencySpec::Instance {
                context: rest.to_string(),
            };
        }
        return DependencySpec::Foreign {
            context: context.to_string(),
            id: rest.to_string(),
        };
    }

    DependencySpec::Local(id.to_string())
}

/// Split `ctx:id` into its two leading segments; further segments are ignored.
pub fn split_reference(id: &str) -> Option<(&str, &str)> {
    let mut parts = id.split(':');
    let context = parts.next()?;
    let rest = parts.next()?;
    if context.is_empty() || rest.is_empty() {
        return None;
    }
    Some((context, rest))
}

pub fn is_reserved(id: &str) -> bool {
    matches!(id, REQUIRE | DEFINE | EXPORTS)
}

/// Reject empty, whitespace-only and reserved module ids.
pub fn validate_module_id(id: &str) -> Result<(), RuntimeError> {
    let compact: String = id.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() || is_reserved(&compact) {
        return Err(RuntimeError::InvalidIdentifier(id.to_string()));
    }
    Ok(())
}

/// Context ids are restricted to `[A-Za-z0-9_.-]`.
pub fn validate_context_id(id: &str) -> Result<(), RuntimeError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(RuntimeError::InvalidContext(id.to_string()))
    }
}
