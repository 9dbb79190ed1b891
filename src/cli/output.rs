//! CLI output: error mapping from runtime errors to the CLI surface.

use crate::error::RuntimeError;

/// Map runtime errors to a string for CLI output.
pub fn map_error(e: &RuntimeError) -> String {
    match e {
        RuntimeError::ConfigError(msg) => format!("Invalid configuration: {}", msg),
        other => other.to_string(),
    }
}
