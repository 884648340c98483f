//! CLI Tooling
//!
//! Command-line interface over the plugin cache: stage environments, run a
//! command inside a synced session, and report cache contents.

use crate::cache::{fsops, CacheRoot, CachedEnvironment, EnvironmentStager};
use crate::config::{ConfigLoader, PluginCacheConfig};
use crate::error::SyncError;
use crate::runtime::{MirrorRuntime, SessionContext};
use crate::session::PluginCache;
use crate::types::EnvironmentName;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde_json::json;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Plugin cache - staged, isolated plugin trees for agent task runs
#[derive(Parser)]
#[command(name = "plugin-cache")]
#[command(about = "Concurrency-safe cache of synced agent plugin trees")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Cache root directory (overrides config)
    #[arg(long, global = true)]
    pub cache_root: Option<PathBuf>,

    /// Local plugin mirror root (overrides config)
    #[arg(long, global = true)]
    pub mirror: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Ensure an environment directory exists and print its path
    Stage {
        environment: String,
    },
    /// Sync an environment and run a command against an ephemeral plugin copy
    Sync {
        environment: String,
        /// Target identity (certname) the command runs against
        #[arg(long)]
        identity: String,
        /// Prefix for the ephemeral workdir name
        #[arg(long)]
        label: Option<String>,
        /// Command and arguments to run
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// List cached environments
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
        /// Include a content digest of each plugin tree
        #[arg(long)]
        digest: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

/// A child command exited unsuccessfully
#[derive(Debug, Error)]
#[error("Command {program:?} exited with {status}")]
pub struct CommandFailed {
    pub program: String,
    pub status: String,
    /// Exit code, when the command was not killed by a signal
    pub code: Option<i32>,
}

pub struct CliContext {
    config: PluginCacheConfig,
    root: CacheRoot,
}

impl CliContext {
    /// Load configuration, apply CLI overrides, and ensure the cache root
    pub fn new(cli: &Cli) -> Result<Self, SyncError> {
        let mut config = ConfigLoader::load(cli.config.as_deref())?;
        apply_overrides(&mut config, cli);
        Self::with_config(config)
    }

    pub fn with_config(config: PluginCacheConfig) -> Result<Self, SyncError> {
        config.validate()?;
        let root = CacheRoot::ensure(&config.cache_root)?;
        Ok(Self { config, root })
    }

    pub fn config(&self) -> &PluginCacheConfig {
        &self.config
    }

    pub fn execute(&self, command: &Commands) -> Result<String, SyncError> {
        match command {
            Commands::Stage { environment } => {
                let environment = EnvironmentName::new(environment.as_str())?;
                let path = EnvironmentStager::new(self.root.clone()).stage(&environment)?;
                Ok(path.display().to_string())
            }
            Commands::Sync {
                environment,
                identity,
                label,
                command,
            } => {
                self.run_sync(environment, identity, label.as_deref(), command)?;
                Ok(String::new())
            }
            Commands::List { format, digest } => {
                let environments = self.root.environments()?;
                match format.as_str() {
                    "json" => format_environments_json(&environments, *digest),
                    "text" => Ok(format_environments_text(&environments, *digest)),
                    other => Err(SyncError::Config(format!(
                        "Invalid format: {} (must be 'text' or 'json')",
                        other
                    ))),
                }
            }
            Commands::Config => toml::to_string_pretty(&self.config)
                .map_err(|e| SyncError::Config(format!("Failed to serialize config: {}", e))),
        }
    }

    fn run_sync(
        &self,
        environment: &str,
        identity: &str,
        label: Option<&str>,
        command: &[String],
    ) -> Result<(), SyncError> {
        let mirror = self.config.mirror_root.clone().ok_or_else(|| {
            SyncError::Config("sync requires a mirror root (--mirror or mirror_root)".to_string())
        })?;

        let mut config = self.config.clone();
        if let Some(label) = label {
            config.workdir_label = label.to_string();
        }
        let cache = PluginCache::from_config(&config, Arc::new(MirrorRuntime::new(mirror)))?;

        cache.with_synced_plugin_dir(environment, identity, |ctx| run_child(ctx, command))
    }
}

fn apply_overrides(config: &mut PluginCacheConfig, cli: &Cli) {
    if let Some(root) = &cli.cache_root {
        config.cache_root = root.clone();
    }
    if let Some(mirror) = &cli.mirror {
        config.mirror_root = Some(mirror.clone());
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }
    if let Some(output) = &cli.log_output {
        config.logging.output = output.clone();
    }
    if let Some(file) = &cli.log_file {
        config.logging.file = Some(file.clone());
    }
}

/// Run `command` as a child process with the session's configuration in its
/// environment
fn run_child(ctx: &SessionContext, command: &[String]) -> anyhow::Result<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("no command given"))?;

    let mut child = Command::new(program);
    child.args(args).envs(ctx.exported_env());

    info!(program = %program, label = %ctx.label(), "Running command in synced session");
    let status = child
        .status()
        .map_err(|e| anyhow::anyhow!("Failed to start {:?}: {}", program, e))?;

    if status.success() {
        Ok(())
    } else {
        Err(CommandFailed {
            program: program.clone(),
            status: status.to_string(),
            code: status.code(),
        }
        .into())
    }
}

fn format_last_touched(entry: &CachedEnvironment) -> Option<String> {
    entry
        .last_touched
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
}

fn digest_of(entry: &CachedEnvironment) -> Option<String> {
    let plugins = entry.path.join("plugins");
    if !plugins.is_dir() {
        return None;
    }
    match fsops::tree_digest(&plugins) {
        Ok(digest) => Some(digest),
        Err(e) => {
            tracing::warn!("Failed to digest {}: {}", plugins.display(), e);
            None
        }
    }
}

/// Format cached environments as a table
pub fn format_environments_text(entries: &[CachedEnvironment], include_digest: bool) -> String {
    if entries.is_empty() {
        return "No cached environments.".to_string();
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    let mut header = vec!["Environment", "Last touched", "Plugin files"];
    if include_digest {
        header.push("Digest");
    }
    table.set_header(header);

    for entry in entries {
        let mut row = vec![
            entry.environment.to_string(),
            format_last_touched(entry).unwrap_or_else(|| "-".to_string()),
            entry.plugin_files.to_string(),
        ];
        if include_digest {
            let digest = digest_of(entry)
                .map(|d| d[..d.len().min(12)].to_string())
                .unwrap_or_else(|| "-".to_string());
            row.push(digest);
        }
        table.add_row(row);
    }
    table.to_string()
}

/// Format cached environments as JSON
pub fn format_environments_json(
    entries: &[CachedEnvironment],
    include_digest: bool,
) -> Result<String, SyncError> {
    let items: Vec<_> = entries
        .iter()
        .map(|entry| {
            let mut item = json!({
                "environment": entry.environment.as_str(),
                "path": entry.path.display().to_string(),
                "last_touched": format_last_touched(entry),
                "plugin_files": entry.plugin_files,
            });
            if include_digest {
                item["digest"] = json!(digest_of(entry));
            }
            item
        })
        .collect();

    serde_json::to_string_pretty(&json!({
        "total": items.len(),
        "environments": items,
    }))
    .map_err(|e| SyncError::Config(format!("Failed to serialize output: {}", e)))
}
