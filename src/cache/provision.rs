//! Ephemeral Workdir Provisioning
//!
//! Stages a disposable, session-private copy of an environment's plugin tree
//! into a freshly allocated temp directory. Allocation relies on the OS for
//! uniqueness and runs outside the cache lock; only the copy and the marker
//! update are exclusive.

use super::fsops::{self, CopyError};
use super::CacheRoot;
use crate::error::SyncError;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Provisions ephemeral workdirs from plugin trees under a cache root
#[derive(Debug, Clone)]
pub struct EphemeralWorkdirProvisioner {
    root: CacheRoot,
    /// Parent for new workdirs; `None` means the OS temp dir
    parent: Option<PathBuf>,
}

impl EphemeralWorkdirProvisioner {
    pub fn new(root: CacheRoot) -> Self {
        Self { root, parent: None }
    }

    pub fn with_parent(mut self, parent: Option<PathBuf>) -> Self {
        self.parent = parent;
        self
    }

    /// Copy `source_plugin_dir` into a new uniquely named temp directory.
    ///
    /// The directory name carries `label` as prefix and the source's
    /// environment and leaf names as suffix.
    pub fn provision(
        &self,
        source_plugin_dir: &Path,
        label: &str,
    ) -> Result<EphemeralWorkdir, SyncError> {
        let source_meta = std::fs::metadata(source_plugin_dir)
            .map_err(|e| SyncError::staging(source_plugin_dir, e))?;
        if !source_meta.is_dir() {
            return Err(SyncError::staging(
                source_plugin_dir,
                io::Error::new(io::ErrorKind::NotFound, "plugin source is not a directory"),
            ));
        }
        // An unreadable source must fail before a workdir is allocated
        let _ = std::fs::read_dir(source_plugin_dir)
            .map_err(|e| SyncError::staging(source_plugin_dir, e))?;

        let prefix = format!("{}-", label);
        let suffix = format!("-{}", workdir_tag(source_plugin_dir));
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(&suffix);
        let allocated = match &self.parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        };
        let dir = allocated.map_err(|e| {
            let parent = self.parent.clone().unwrap_or_else(std::env::temp_dir);
            SyncError::provisioning(parent, e)
        })?;
        // Owned from here on so a failed copy is cleaned up like any workdir
        let workdir = EphemeralWorkdir { dir: Some(dir) };

        self.root.lock().with_exclusive(|| {
            fsops::copy_tree(source_plugin_dir, workdir.path()).map_err(copy_error)?;
            fsops::touch(workdir.path()).map_err(|e| SyncError::provisioning(workdir.path(), e))
        })?;

        debug!(
            source = %source_plugin_dir.display(),
            workdir = %workdir.path().display(),
            "Provisioned ephemeral workdir"
        );
        Ok(workdir)
    }
}

/// Source read failures are staging failures; write-side failures are
/// provisioning failures.
fn copy_error(err: CopyError) -> SyncError {
    match err {
        CopyError::Read { path, source } => SyncError::staging(path, source),
        CopyError::Write { path, source } => SyncError::provisioning(path, source),
    }
}

fn workdir_tag(source_plugin_dir: &Path) -> String {
    let mut parts: Vec<String> = source_plugin_dir
        .components()
        .rev()
        .take(2)
        .filter_map(|c| match c {
            std::path::Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.reverse();
    if parts.is_empty() {
        "plugins".to_string()
    } else {
        parts.join("-")
    }
}

/// A provisioned workdir, exclusively owned by one session.
///
/// Removed recursively by [`EphemeralWorkdir::close`]; dropping the handle
/// without closing removes it as well. Read-only directories copied from the
/// plugin tree are opened up first so removal cannot be blocked by them.
#[derive(Debug)]
pub struct EphemeralWorkdir {
    dir: Option<TempDir>,
}

impl EphemeralWorkdir {
    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => Path::new(""),
        }
    }

    /// Remove the workdir, reporting any failure
    pub fn close(mut self) -> io::Result<()> {
        match self.dir.take() {
            Some(dir) => {
                prepare_removal(&dir);
                dir.close()
            }
            None => Ok(()),
        }
    }
}

impl Drop for EphemeralWorkdir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            prepare_removal(&dir);
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(workdir = %path.display(), "Failed to remove ephemeral workdir: {}", e);
            }
        }
    }
}

fn prepare_removal(dir: &TempDir) {
    if let Err(e) = fsops::make_removable(dir.path()) {
        debug!(
            workdir = %dir.path().display(),
            "Could not open up workdir permissions: {}",
            e
        );
    }
}
