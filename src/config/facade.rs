//! Layered configuration loading.

use super::merge::merge_policy;
use super::sources::{global_file, project_file};
use super::RuntimeConfig;
use config::{Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads [`RuntimeConfig`] from defaults, config files and `MODLINK_*` variables.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a project directory.
    ///
    /// Precedence (lowest to highest): defaults, user config file,
    /// `modlink.toml`, `modlink.{MODLINK_ENV}.toml`, environment.
    pub fn load(project_root: &Path) -> Result<RuntimeConfig, config::ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = project_file::add_to_builder(builder, project_root)?;
        let config = builder.add_source(Self::environment()).build()?;
        let loaded: RuntimeConfig = config.try_deserialize()?;
        debug!(contexts = loaded.contexts.len(), "Configuration loaded");
        Ok(loaded)
    }

    /// Load configuration from one explicit file (plus defaults and environment).
    pub fn load_from_file(path: &Path) -> Result<RuntimeConfig, config::ConfigError> {
        let config = merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .add_source(Self::environment())
            .build()?;
        config.try_deserialize()
    }

    pub fn user_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    fn environment() -> Environment {
        Environment::with_prefix("MODLINK").separator("__")
    }
}
