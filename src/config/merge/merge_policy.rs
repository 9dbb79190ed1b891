//! Merge rules: defaults first, then files, then environment.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("location", crate::config::DEFAULT_LOCATION)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")
}
