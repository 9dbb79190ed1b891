//! Error types for the modlink dependency runtime.
//!
//! Every variant carries owned strings so a single outcome can be cloned and
//! delivered to every waiter queued against the same load or execution.

use thiserror::Error;

/// Runtime errors surfaced to callers of `define`, `require` and friends
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Invalid module id: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid context id: {0:?}")]
    InvalidContext(String),

    #[error("Error loading resource {locator}: {reason}")]
    ResourceLoad { locator: String, reason: String },

    #[error("Shim export '{export}' not found for: {id}")]
    ShimExportMissing { id: String, export: String },

    #[error("Module not yet executed: {0}")]
    NotExecuted(String),

    #[error("Unknown context: {0}")]
    UnknownContext(String),

    #[error("Dependency cycle detected: {}", chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    #[error("Factory for module '{module}' failed: {message}")]
    FactoryFailed { module: String, message: String },

    #[error("Cannot find package named: {0}")]
    PackageNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Pending operation abandoned: {0}")]
    Abandoned(String),
}

impl RuntimeError {
    /// Wrap an arbitrary loader failure as a load error for `locator`.
    ///
    /// Errors that already name a locator are passed through untouched.
    pub fn into_load_error(self, locator: &str) -> RuntimeError {
        match self {
            err @ RuntimeError::ResourceLoad { .. } => err,
            other => RuntimeError::ResourceLoad {
                locator: locator.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<config::ConfigError> for RuntimeError {
    fn from(err: config::ConfigError) -> Self {
        RuntimeError::ConfigError(err.to_string())
    }
}
