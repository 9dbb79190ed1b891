//! CLI route: single route table and run context.

use crate::cache::CacheHints;
use crate::config::{ConfigLoader, ContextConfig, RuntimeConfig, DEFAULT_CONTEXT};
use crate::context::Context;
use crate::error::RuntimeError;
use crate::identifier::{classify, DependencySpec};
use crate::loader::{ResourceKind, ScriptedLoader};
use crate::runtime::Runtime;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cli::parse::Commands;

/// Configuration resolved for one CLI invocation.
pub struct RunContext {
    config: RuntimeConfig,
    project_root: PathBuf,
    config_path: Option<PathBuf>,
}

/// One located module id
#[derive(Debug, Serialize)]
struct LocateRow {
    raw: String,
    id: String,
    kind: &'static str,
    context: String,
    locator: Option<String>,
    url: Option<String>,
}

impl RunContext {
    /// Create run context from a project root and optional config path. Uses ConfigLoader only.
    pub fn new(project_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, RuntimeError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&project_root)?,
        };
        Ok(Self {
            config,
            project_root,
            config_path,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Execute a command and return its output text.
    pub fn execute(&self, command: &Commands) -> Result<String, RuntimeError> {
        match command {
            Commands::Locate { ids, context, format } => self.handle_locate(ids, context.as_deref(), format),
            Commands::Config { validate } => self.handle_config(*validate),
        }
    }

    fn handle_locate(&self, ids: &[String], context: Option<&str>, format: &str) -> Result<String, RuntimeError> {
        // Nothing is loaded, the loader only has to exist
        let runtime = Runtime::new(&self.config, Arc::new(ScriptedLoader::new().lenient()))?;
        let context_id = context
            .map(str::to_string)
            .or_else(|| self.config.contexts.first().map(|c| c.context.clone()))
            .unwrap_or_else(|| DEFAULT_CONTEXT.to_string());
        let context = match runtime.get_instance(&context_id) {
            Some(context) => context,
            None => {
                debug!(context = %context_id, "Context not configured, using defaults");
                runtime.instantiate(ContextConfig::new(context_id.as_str()))?
            }
        };

        let rows = ids
            .iter()
            .map(|raw| locate(&context, raw))
            .collect::<Result<Vec<_>, _>>()?;
        info!(context = %context.id(), count = rows.len(), "Located modules");

        match format {
            "json" => serde_json::to_string_pretty(&json!({
                "context": context.id(),
                "modules": rows,
            }))
            .map_err(|e| RuntimeError::ConfigError(format!("Failed to serialize output: {}", e))),
            "text" => Ok(format_rows_text(&rows)),
            other => Err(RuntimeError::ConfigError(format!(
                "Invalid output format: {} (must be 'text' or 'json')",
                other
            ))),
        }
    }

    fn handle_config(&self, validate: bool) -> Result<String, RuntimeError> {
        if let Err(errors) = self.config.validate() {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(RuntimeError::ConfigError(messages.join("\n")));
        }

        if validate {
            let source = match &self.config_path {
                Some(path) => path.display().to_string(),
                None => self.project_root.display().to_string(),
            };
            return Ok(format!(
                "Configuration valid ({}): {} context(s), {} package(s), {} cache condition(s)",
                source,
                self.config.contexts.len(),
                self.config.packages.len(),
                self.config.cache.conditions.len()
            ));
        }

        toml::to_string_pretty(&self.config)
            .map_err(|e| RuntimeError::ConfigError(format!("Failed to serialize configuration: {}", e)))
    }
}

fn locate(context: &Context, raw: &str) -> Result<LocateRow, RuntimeError> {
    let id = context.normalize(raw)?;
    let (kind, target) = match classify(&id) {
        DependencySpec::Reserved(_) => ("reserved", None),
        DependencySpec::Instance { .. } => ("instance", None),
        DependencySpec::Foreign { context: target, id } => {
            ("foreign", context.get_instance(&target).map(|instance| (instance, id)))
        }
        DependencySpec::Local(id) => ("module", Some((context.clone(), id))),
    };

    let mut row = LocateRow {
        raw: raw.to_string(),
        id: id.clone(),
        kind,
        context: context.id().to_string(),
        locator: None,
        url: None,
    };
    if let Some((owner, module_id)) = target {
        let locator = owner.locator_for(&module_id)?;
        let request = owner.request(
            locator.clone(),
            Some(module_id),
            ResourceKind::Module,
            &CacheHints::default(),
        )?;
        row.context = owner.id().to_string();
        row.locator = Some(locator);
        row.url = Some(request.url);
    }
    Ok(row)
}

fn format_rows_text(rows: &[LocateRow]) -> String {
    let mut out = String::new();
    for row in rows {
        out.push_str(&format!("{} -> {} [{}] ({})\n", row.raw, row.id, row.kind, row.context));
        if let (Some(locator), Some(url)) = (&row.locator, &row.url) {
            out.push_str(&format!("  locator: {}\n  url:     {}\n", locator, url));
        }
    }
    out.trim_end().to_string()
}
