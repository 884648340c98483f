//! Error types for plugin cache operations.
//!
//! Every error is terminal for the session that raised it. The session runs
//! teardown before the error reaches its caller.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Stage of a sync session that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Configuration,
    EnterContext,
    ResolveEnvironment,
    StageEnvironment,
    DownloadPlugins,
    ProvisionWorkdir,
    UnitOfWork,
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncStage::Configuration => "configuration",
            SyncStage::EnterContext => "enter-context",
            SyncStage::ResolveEnvironment => "resolve-environment",
            SyncStage::StageEnvironment => "stage-environment",
            SyncStage::DownloadPlugins => "download-plugins",
            SyncStage::ProvisionWorkdir => "provision-workdir",
            SyncStage::UnitOfWork => "unit-of-work",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote lookup of an environment failed
    #[error("Failed to resolve environment '{environment}': {reason}")]
    EnvironmentResolution { environment: String, reason: String },

    /// Transport or remote failure while fetching plugins
    #[error("Failed to download plugins for environment '{environment}': {reason}")]
    Download { environment: String, reason: String },

    /// Local filesystem operation on the cache root failed
    #[error("Staging failed at {}: {source}", path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: io::Error,
        /// Session stage the failure was raised in
        stage: SyncStage,
    },

    /// Temp directory allocation or plugin tree copy failed
    #[error("Provisioning failed at {}: {source}", path.display())]
    Provisioning {
        path: PathBuf,
        #[source]
        source: io::Error,
        stage: SyncStage,
    },

    /// The isolated execution context could not be entered
    #[error("Failed to enter isolated context: {0}")]
    Context(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller's unit of work failed; carried unchanged
    #[error(transparent)]
    Callback(anyhow::Error),
}

impl SyncError {
    pub fn staging(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SyncError::Staging {
            path: path.into(),
            source,
            stage: SyncStage::StageEnvironment,
        }
    }

    pub fn provisioning(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SyncError::Provisioning {
            path: path.into(),
            source,
            stage: SyncStage::ProvisionWorkdir,
        }
    }

    /// Record the session stage a filesystem error was raised in. Other
    /// variants already name their stage and are returned unchanged.
    pub fn at_stage(mut self, raised_in: SyncStage) -> Self {
        if let SyncError::Staging { stage, .. } | SyncError::Provisioning { stage, .. } = &mut self
        {
            *stage = raised_in;
        }
        self
    }

    /// The session stage this error belongs to
    pub fn stage(&self) -> SyncStage {
        match self {
            SyncError::EnvironmentResolution { .. } => SyncStage::ResolveEnvironment,
            SyncError::Download { .. } => SyncStage::DownloadPlugins,
            SyncError::Staging { stage, .. } | SyncError::Provisioning { stage, .. } => *stage,
            SyncError::Context(_) => SyncStage::EnterContext,
            SyncError::Config(_) => SyncStage::Configuration,
            SyncError::Callback(_) => SyncStage::UnitOfWork,
        }
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::Config(err.to_string())
    }
}
