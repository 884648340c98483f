//! Per-environment staging directories under the cache root.

use super::{fsops, CacheRoot};
use crate::error::SyncError;
use crate::types::EnvironmentName;
use std::path::PathBuf;
use tracing::debug;

/// Ensures `rootPath/<environment>` exists and refreshes its marker
#[derive(Debug, Clone)]
pub struct EnvironmentStager {
    root: CacheRoot,
}

impl EnvironmentStager {
    pub fn new(root: CacheRoot) -> Self {
        Self { root }
    }

    /// Create-or-touch the environment directory and return its path.
    ///
    /// The create and touch run as one exclusive section, so any number of
    /// concurrent callers for the same name all succeed.
    pub fn stage(&self, environment: &EnvironmentName) -> Result<PathBuf, SyncError> {
        let environment_dir = self.root.environment_path(environment);

        self.root.lock().with_exclusive(|| {
            std::fs::create_dir_all(&environment_dir)
                .map_err(|e| SyncError::staging(&environment_dir, e))?;
            fsops::touch(&environment_dir).map_err(|e| SyncError::staging(&environment_dir, e))
        })?;

        debug!(
            environment = %environment,
            path = %environment_dir.display(),
            "Staged environment directory"
        );
        Ok(environment_dir)
    }
}
