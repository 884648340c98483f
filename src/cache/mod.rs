//! Plugin Cache Root
//!
//! The on-disk cache directory shared by every session on this host, one
//! subdirectory per environment. Structural mutations go through
//! [`EnvironmentStager`] and [`EphemeralWorkdirProvisioner`], both of which
//! hold the root's [`CacheLock`] while they touch the disk.

pub mod fsops;
pub mod provision;
pub mod stager;

pub use provision::{EphemeralWorkdir, EphemeralWorkdirProvisioner};
pub use stager::EnvironmentStager;

use crate::concurrency::{CacheLock, LOCK_FILE_NAME};
use crate::error::SyncError;
use crate::types::EnvironmentName;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Handle to the shared cache root. Cheap to clone; clones share the lock.
#[derive(Debug, Clone)]
pub struct CacheRoot {
    inner: Arc<CacheRootInner>,
}

#[derive(Debug)]
struct CacheRootInner {
    path: PathBuf,
    lock: CacheLock,
}

impl CacheRoot {
    /// Create the root directory tree if missing and return a handle to it.
    ///
    /// Idempotent. Meant to run once at process startup.
    pub fn ensure(root_path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let root_path = root_path.as_ref();
        std::fs::create_dir_all(root_path).map_err(|e| SyncError::staging(root_path, e))?;
        let path = dunce::canonicalize(root_path).map_err(|e| SyncError::staging(root_path, e))?;

        tracing::debug!(cache_root = %path.display(), "Cache root ready");
        Ok(Self {
            inner: Arc::new(CacheRootInner {
                lock: CacheLock::new(&path),
                path,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn lock(&self) -> &CacheLock {
        &self.inner.lock
    }

    /// `rootPath/<environment>`; does not touch the disk
    pub fn environment_path(&self, environment: &EnvironmentName) -> PathBuf {
        self.inner.path.join(environment.as_str())
    }

    /// List cached environment directories.
    ///
    /// Reporting only: no lock is taken, and entries removed while listing
    /// are skipped.
    pub fn environments(&self) -> Result<Vec<CachedEnvironment>, SyncError> {
        let entries =
            std::fs::read_dir(self.path()).map_err(|e| SyncError::staging(self.path(), e))?;

        let mut cached = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(
                        "Failed to read directory entry in {}: {}",
                        self.path().display(),
                        e
                    );
                    continue;
                }
            };

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                tracing::warn!("Skipping non UTF8 cache entry: {:?}", entry.path());
                continue;
            };
            if name == LOCK_FILE_NAME {
                continue;
            }
            let Ok(environment) = EnvironmentName::new(name) else {
                tracing::debug!("Skipping foreign cache entry: {}", name);
                continue;
            };

            let metadata = match entry.metadata() {
                Ok(m) if m.is_dir() => m,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!("Cache entry {} vanished while listing: {}", name, e);
                    continue;
                }
            };

            let path = entry.path();
            let paths = EnvironmentPaths::new(&path);
            cached.push(CachedEnvironment {
                plugin_files: fsops::count_files(&paths.plugin_dest_dir),
                last_touched: metadata.modified().ok(),
                environment,
                path,
            });
        }

        cached.sort_by(|a, b| a.environment.cmp(&b.environment));
        Ok(cached)
    }
}

/// Path family derived from one staged environment directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentPaths {
    pub var_dir: PathBuf,
    pub conf_dir: PathBuf,
    pub run_dir: PathBuf,
    pub log_dir: PathBuf,
    pub code_dir: PathBuf,
    pub plugin_dest_dir: PathBuf,
}

impl EnvironmentPaths {
    pub fn new(environment_dir: &Path) -> Self {
        Self {
            var_dir: environment_dir.to_path_buf(),
            conf_dir: environment_dir.join("conf"),
            run_dir: environment_dir.join("run"),
            log_dir: environment_dir.join("log"),
            code_dir: environment_dir.join("code"),
            plugin_dest_dir: environment_dir.join("plugins"),
        }
    }
}

/// One entry of [`CacheRoot::environments`]
#[derive(Debug, Clone, Serialize)]
pub struct CachedEnvironment {
    pub environment: EnvironmentName,
    pub path: PathBuf,
    /// Modification marker refreshed on every stage
    pub last_touched: Option<SystemTime>,
    pub plugin_files: usize,
}
