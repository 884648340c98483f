//! Configuration
//!
//! Layered configuration for the plugin cache. Precedence, lowest first:
//! built-in defaults, global config file, explicit config file, then
//! `PLUGIN_CACHE__*` environment variables (`__` separates nested keys).

pub mod loader;
pub mod xdg;

pub use loader::ConfigLoader;

use crate::error::SyncError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_cache_root() -> PathBuf {
    xdg::default_cache_root()
}

fn default_keep_alive_timeout_secs() -> u64 {
    4
}

fn default_workdir_label() -> String {
    "plugins".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginCacheConfig {
    /// Shared directory holding one subdirectory per environment
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,

    /// Keep-alive timeout of each session's network pool, in seconds
    #[serde(default = "default_keep_alive_timeout_secs")]
    pub keep_alive_timeout_secs: u64,

    /// Prefix of ephemeral workdir names
    #[serde(default = "default_workdir_label")]
    pub workdir_label: String,

    /// Parent of ephemeral workdirs (default: OS temp dir)
    #[serde(default)]
    pub workdir_parent: Option<PathBuf>,

    /// Local mirror used by the mirror runtime
    #[serde(default)]
    pub mirror_root: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for PluginCacheConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            keep_alive_timeout_secs: default_keep_alive_timeout_secs(),
            workdir_label: default_workdir_label(),
            workdir_parent: None,
            mirror_root: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl PluginCacheConfig {
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.cache_root.as_os_str().is_empty() {
            return Err(SyncError::Config("cache_root must not be empty".to_string()));
        }
        if self.keep_alive_timeout_secs == 0 {
            return Err(SyncError::Config(
                "keep_alive_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.workdir_label.is_empty() {
            return Err(SyncError::Config("workdir_label must not be empty".to_string()));
        }
        if self.workdir_label.contains(['/', '\\']) {
            return Err(SyncError::Config(format!(
                "workdir_label must not contain path separators: {}",
                self.workdir_label
            )));
        }
        Ok(())
    }
}
