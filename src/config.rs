//! Configuration System
//!
//! Runtime-wide settings (page location, cache policy, package list, logging)
//! and per-context settings (base paths, aliases, shims, packages, readiness).
//! Loaded in layers by [`ConfigLoader`] and validated before use.

use crate::cache::{CacheCondition, CacheRule};
use crate::identifier::{validate_context_id, validate_module_id, PathAlias};
use crate::logging::LoggingConfig;
use crate::paths::Location;
use crate::shim::ShimDeclaration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Context id used when none is configured
pub const DEFAULT_CONTEXT: &str = "_";

/// Page location used when none is configured
pub const DEFAULT_LOCATION: &str = "http://localhost/";

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Page location relative resources resolve against
    #[serde(default = "default_location")]
    pub location: String,

    /// Cache-busting settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Package list: package (context) id to resource path
    #[serde(default)]
    pub packages: BTreeMap<String, String>,

    /// Contexts instantiated at startup, in order
    #[serde(default)]
    pub contexts: Vec<ContextConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_location() -> String {
    DEFAULT_LOCATION.to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            location: default_location(),
            cache: CacheSettings::default(),
            packages: BTreeMap::new(),
            contexts: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Runtime-wide cache parameter and conditions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Shared cache parameter value appended to every locator
    #[serde(default)]
    pub param: Option<String>,

    /// Ordered pattern rules; first match wins
    #[serde(default)]
    pub conditions: Vec<CacheRule>,
}

impl CacheSettings {
    pub fn compile(&self) -> Result<Vec<CacheCondition>, crate::error::RuntimeError> {
        self.conditions.iter().map(CacheCondition::try_from).collect()
    }
}

/// A package reference: a name from the package list, or inline `id → src` entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PackageRef {
    Named(String),
    Inline(BTreeMap<String, String>),
}

/// Per-context configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Context id
    #[serde(default = "default_context", alias = "instance")]
    pub context: String,

    /// Domain resources resolve against (defaults to the page domain)
    #[serde(default)]
    pub base_domain: Option<String>,

    /// Base path for module locators (defaults to the page directory)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Extension appended to module locators
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Identifier substitutions, applied in order
    #[serde(default)]
    pub paths: Vec<PathAlias>,

    /// Shim declarations
    #[serde(default)]
    pub shim: Vec<ShimDeclaration>,

    /// Packages loaded during initialization
    #[serde(default)]
    pub packages: Vec<PackageRef>,

    /// Prerequisite resource loaded before the first resolution
    #[serde(default)]
    pub master_file: Option<String>,

    /// Cache parameter name for this context's locators
    #[serde(default)]
    pub cache_param: Option<String>,

    /// Wait for the readiness signal before resolving
    #[serde(default = "default_true")]
    pub wait: bool,
}

fn default_context() -> String {
    DEFAULT_CONTEXT.to_string()
}

fn default_extension() -> String {
    ".js".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            context: default_context(),
            base_domain: None,
            base_url: None,
            extension: default_extension(),
            paths: Vec::new(),
            shim: Vec::new(),
            packages: Vec::new(),
            master_file: None,
            cache_param: None,
            wait: default_true(),
        }
    }
}

impl ContextConfig {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            ..Self::default()
        }
    }

    /// Resolve immediately instead of waiting for readiness
    pub fn no_wait(mut self) -> Self {
        self.wait = false;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_base_domain(mut self, base_domain: impl Into<String>) -> Self {
        self.base_domain = Some(base_domain.into());
        self
    }

    pub fn with_alias(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.paths.push(PathAlias::new(from, to));
        self
    }

    pub fn with_shim(mut self, shim: ShimDeclaration) -> Self {
        self.shim.push(shim);
        self
    }

    pub fn with_package(mut self, package: PackageRef) -> Self {
        self.packages.push(package);
        self
    }

    pub fn with_master_file(mut self, master_file: impl Into<String>) -> Self {
        self.master_file = Some(master_file.into());
        self
    }

    pub fn with_cache_param(mut self, name: impl Into<String>) -> Self {
        self.cache_param = Some(name.into());
        self
    }

    /// Validate context configuration
    pub fn validate(&self) -> Result<(), String> {
        validate_context_id(&self.context).map_err(|e| e.to_string())?;

        if let Some(alias) = self.paths.iter().find(|alias| alias.from.is_empty()) {
            return Err(format!("Path alias with empty pattern (to '{}')", alias.to));
        }

        let mut shim_ids = HashSet::new();
        for shim in &self.shim {
            validate_module_id(&shim.id).map_err(|e| e.to_string())?;
            if shim.exports.trim().is_empty() {
                return Err(format!("Shim '{}' declares no export path", shim.id));
            }
            if shim.src.trim().is_empty() {
                return Err(format!("Shim '{}' declares no resource", shim.id));
            }
            if !shim_ids.insert(shim.id.as_str()) {
                return Err(format!("Duplicate shim id '{}'", shim.id));
            }
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Context(String, String),
    Cache(String),
    System(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Context(name, msg) => write!(f, "Context '{}': {}", name, msg),
            ValidationError::Cache(msg) => write!(f, "Cache: {}", msg),
            ValidationError::System(msg) => write!(f, "System: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl RuntimeConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = Location::parse(&self.location) {
            errors.push(ValidationError::System(e.to_string()));
        }

        if let Err(e) = self.cache.compile() {
            errors.push(ValidationError::Cache(e.to_string()));
        }

        for (id, src) in &self.packages {
            if let Err(e) = validate_context_id(id) {
                errors.push(ValidationError::System(format!("Package list: {}", e)));
            }
            if src.trim().is_empty() {
                errors.push(ValidationError::System(format!("Package '{}' has no resource", id)));
            }
        }

        let mut seen = HashSet::new();
        for context in &self.contexts {
            if let Err(e) = context.validate() {
                errors.push(ValidationError::Context(context.context.clone(), e));
            }
            if !seen.insert(context.context.as_str()) {
                errors.push(ValidationError::Context(
                    context.context.clone(),
                    "Duplicate context id".to_string(),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
