//! Isolated execution context of one sync session.
//!
//! Holds everything the agent runtime would otherwise keep as process-wide
//! settings: the path family, the library dir, the module search path, and
//! the active network pool. One context per session; never shared.

use super::NetworkPool;
use crate::cache::EnvironmentPaths;
use crate::types::{EnvironmentName, Identity};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Configuration assigned during a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActiveConfig {
    /// Set once the environment directory is staged
    pub paths: Option<EnvironmentPaths>,
    /// Set once the ephemeral workdir is provisioned
    pub lib_dir: Option<PathBuf>,
}

pub struct SessionContext {
    label: String,
    environment: EnvironmentName,
    identity: Identity,
    pool: Option<Box<dyn NetworkPool>>,
    config: ActiveConfig,
    module_search_path: Vec<PathBuf>,
}

impl SessionContext {
    /// Enter a fresh context for one (environment, identity) pair with
    /// `pool` as its active network pool
    pub fn push_isolated(
        environment: EnvironmentName,
        identity: Identity,
        pool: Box<dyn NetworkPool>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            environment,
            identity,
            pool: Some(pool),
            config: ActiveConfig::default(),
            module_search_path: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn environment(&self) -> &EnvironmentName {
        &self.environment
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn set_active_config(&mut self, paths: EnvironmentPaths) {
        self.config.paths = Some(paths);
    }

    pub fn set_lib_dir(&mut self, lib_dir: impl Into<PathBuf>) {
        self.config.lib_dir = Some(lib_dir.into());
    }

    pub fn append_to_module_search_path(&mut self, path: impl Into<PathBuf>) {
        self.module_search_path.push(path.into());
    }

    pub fn active_config(&self) -> &ActiveConfig {
        &self.config
    }

    pub fn plugin_dest_dir(&self) -> Option<&Path> {
        self.config
            .paths
            .as_ref()
            .map(|paths| paths.plugin_dest_dir.as_path())
    }

    pub fn lib_dir(&self) -> Option<&Path> {
        self.config.lib_dir.as_deref()
    }

    pub fn module_search_path(&self) -> &[PathBuf] {
        &self.module_search_path
    }

    pub fn network_pool(&self) -> Option<&dyn NetworkPool> {
        self.pool.as_deref()
    }

    pub(crate) fn take_network_pool(&mut self) -> Option<Box<dyn NetworkPool>> {
        self.pool.take()
    }

    /// The active configuration as environment variables for a child process
    pub fn exported_env(&self) -> Vec<(String, OsString)> {
        let mut vars = vec![
            (
                "PLUGIN_CACHE_ENVIRONMENT".to_string(),
                OsString::from(self.environment.as_str()),
            ),
            (
                "PLUGIN_CACHE_IDENTITY".to_string(),
                OsString::from(self.identity.as_str()),
            ),
        ];

        if let Some(paths) = &self.config.paths {
            for (name, path) in [
                ("PLUGIN_CACHE_VARDIR", &paths.var_dir),
                ("PLUGIN_CACHE_CONFDIR", &paths.conf_dir),
                ("PLUGIN_CACHE_RUNDIR", &paths.run_dir),
                ("PLUGIN_CACHE_LOGDIR", &paths.log_dir),
                ("PLUGIN_CACHE_CODEDIR", &paths.code_dir),
                ("PLUGIN_CACHE_PLUGINDEST", &paths.plugin_dest_dir),
            ] {
                vars.push((name.to_string(), path.clone().into_os_string()));
            }
        }
        if let Some(lib_dir) = &self.config.lib_dir {
            vars.push((
                "PLUGIN_CACHE_LIBDIR".to_string(),
                lib_dir.clone().into_os_string(),
            ));
        }
        if !self.module_search_path.is_empty() {
            // join_paths only fails on entries containing the separator
            if let Ok(joined) = std::env::join_paths(&self.module_search_path) {
                vars.push(("PLUGIN_CACHE_MODULE_PATH".to_string(), joined));
            }
        }
        vars
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("label", &self.label)
            .field("environment", &self.environment)
            .field("identity", &self.identity)
            .field("pool_open", &self.pool.as_ref().map(|p| !p.is_closed()))
            .field("config", &self.config)
            .field("module_search_path", &self.module_search_path)
            .finish()
    }
}
