//! Exclusive lock guarding structural mutation of the cache root
//!
//! Every create, copy, or touch under the cache root happens while holding
//! the cache lock. The lock has two layers: an in-process mutex serializing
//! threads, and an advisory file lock serializing separate processes that
//! share the same cache root. Only exclusive mode exists.

use crate::error::SyncError;
use fs4::FileExt;
use parking_lot::{Mutex, MutexGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the lock file kept at the top of the cache root
pub const LOCK_FILE_NAME: &str = ".lock";

/// Lock associated 1:1 with a cache root
pub struct CacheLock {
    local: Mutex<()>,
    lock_file: PathBuf,
}

/// Held exclusive section. Both layers release on drop.
#[derive(Debug)]
pub struct CacheLockGuard<'a> {
    // Field order matters: the file lock is released before the mutex.
    _file: File,
    _local: MutexGuard<'a, ()>,
}

impl CacheLock {
    pub fn new(root: &Path) -> Self {
        Self {
            local: Mutex::new(()),
            lock_file: root.join(LOCK_FILE_NAME),
        }
    }

    pub fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    /// Acquire the lock in exclusive mode, blocking until available
    pub fn exclusive(&self) -> Result<CacheLockGuard<'_>, SyncError> {
        let local = self.local.lock();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.lock_file)
            .map_err(|e| SyncError::staging(&self.lock_file, e))?;
        file.lock_exclusive()
            .map_err(|e| SyncError::staging(&self.lock_file, e))?;

        debug!(lock_file = %self.lock_file.display(), "Acquired exclusive cache lock");
        Ok(CacheLockGuard {
            _file: file,
            _local: local,
        })
    }

    /// Run `f` inside an exclusive section
    pub fn with_exclusive<T>(
        &self,
        f: impl FnOnce() -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        let _guard = self.exclusive()?;
        f()
    }
}

impl std::fmt::Debug for CacheLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLock")
            .field("lock_file", &self.lock_file)
            .finish()
    }
}
