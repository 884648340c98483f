//! PluginCache facade: one per process, shared by every session.

use super::IsolatedSyncSession;
use crate::cache::{CacheRoot, EnvironmentStager, EphemeralWorkdir, EphemeralWorkdirProvisioner};
use crate::config::PluginCacheConfig;
use crate::error::SyncError;
use crate::runtime::{AgentRuntime, SessionContext};
use crate::types::{EnvironmentName, Identity};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Per-session knobs taken from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Keep-alive timeout of the session's network pool
    pub keep_alive: Duration,
    /// Prefix of ephemeral workdir names
    pub label: String,
    /// Parent of ephemeral workdirs; `None` means the OS temp dir
    pub workdir_parent: Option<PathBuf>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(4),
            label: "plugins".to_string(),
            workdir_parent: None,
        }
    }
}

impl From<&PluginCacheConfig> for SessionSettings {
    fn from(config: &PluginCacheConfig) -> Self {
        Self {
            keep_alive: Duration::from_secs(config.keep_alive_timeout_secs),
            label: config.workdir_label.clone(),
            workdir_parent: config.workdir_parent.clone(),
        }
    }
}

/// Cache of synced plugin trees keyed by environment name
#[derive(Clone)]
pub struct PluginCache {
    root: CacheRoot,
    stager: EnvironmentStager,
    provisioner: EphemeralWorkdirProvisioner,
    runtime: Arc<dyn AgentRuntime>,
    settings: SessionSettings,
}

impl PluginCache {
    /// Ensure the cache root exists and build the cache around it
    pub fn setup(
        cache_root: impl AsRef<Path>,
        runtime: Arc<dyn AgentRuntime>,
        settings: SessionSettings,
    ) -> Result<Self, SyncError> {
        let root = CacheRoot::ensure(cache_root)?;
        Ok(Self {
            stager: EnvironmentStager::new(root.clone()),
            provisioner: EphemeralWorkdirProvisioner::new(root.clone())
                .with_parent(settings.workdir_parent.clone()),
            root,
            runtime,
            settings,
        })
    }

    pub fn from_config(
        config: &PluginCacheConfig,
        runtime: Arc<dyn AgentRuntime>,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        Self::setup(&config.cache_root, runtime, SessionSettings::from(config))
    }

    pub fn root(&self) -> &CacheRoot {
        &self.root
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Create-or-touch the environment directory
    pub fn stage(&self, environment: &str) -> Result<PathBuf, SyncError> {
        self.stager.stage(&EnvironmentName::new(environment)?)
    }

    /// Copy a plugin tree into a fresh ephemeral workdir
    pub fn provision(
        &self,
        source_plugin_dir: &Path,
        label: &str,
    ) -> Result<EphemeralWorkdir, SyncError> {
        self.provisioner.provision(source_plugin_dir, label)
    }

    /// A session for one (environment, identity) pair, not yet started
    pub fn session(
        &self,
        environment: &str,
        identity: &str,
    ) -> Result<IsolatedSyncSession<'_>, SyncError> {
        Ok(IsolatedSyncSession::new(
            self.runtime.as_ref(),
            &self.stager,
            &self.provisioner,
            &self.settings,
            EnvironmentName::new(environment)?,
            Identity::new(identity)?,
        ))
    }

    /// Sync `environment`'s plugins and run `unit_of_work` against an
    /// ephemeral copy of them.
    ///
    /// The unit of work sees the staged paths, the workdir as library dir,
    /// and the session's network pool through its [`SessionContext`]. The
    /// workdir is gone and the pool closed by the time this returns.
    pub fn with_synced_plugin_dir<T, F>(
        &self,
        environment: &str,
        identity: &str,
        unit_of_work: F,
    ) -> Result<T, SyncError>
    where
        F: FnOnce(&SessionContext) -> anyhow::Result<T>,
    {
        self.session(environment, identity)?.run(unit_of_work)
    }
}

impl std::fmt::Debug for PluginCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCache")
            .field("root", &self.root.path())
            .field("settings", &self.settings)
            .finish()
    }
}
