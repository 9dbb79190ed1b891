//! CLI parse: clap types for modlink. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// modlink CLI - inspect module resolution for a configured runtime
#[derive(Parser)]
#[command(name = "modlink")]
#[command(about = "Inspect identifier normalization, locators and cache keys of a modlink runtime")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project directory searched for modlink.toml
    #[arg(long, default_value = ".")]
    pub project: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print normalized ids, locators and cache-busted URLs for module ids
    Locate {
        /// Module ids to locate
        #[arg(required = true)]
        ids: Vec<String>,
        /// Context to resolve in (defaults to the first configured context)
        #[arg(long)]
        context: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the effective configuration
    Config {
        /// Only validate, printing a summary instead of the configuration
        #[arg(long)]
        validate: bool,
    },
}
