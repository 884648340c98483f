//! Local Mirror Runtime
//!
//! Agent runtime that resolves environments as directories under a local
//! mirror root (`<mirror>/<environment>/plugins`) and syncs that tree into the
//! session's plugin destination.
//!
//! Files are written to a temp file beside the environment directory and
//! renamed into place, so a concurrent reader of the destination sees either
//! the old or the new file, never a partial one. Entries missing from the
//! mirror are purged.

use super::{AgentRuntime, SessionContext};
use crate::error::SyncError;
use crate::types::{EnvironmentHandle, EnvironmentName};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

const STAGING_PREFIX: &str = ".plugin-sync-";

#[derive(Debug, Clone)]
pub struct MirrorRuntime {
    mirror_root: PathBuf,
}

impl MirrorRuntime {
    pub fn new(mirror_root: impl Into<PathBuf>) -> Self {
        Self {
            mirror_root: mirror_root.into(),
        }
    }

    pub fn mirror_root(&self) -> &Path {
        &self.mirror_root
    }
}

impl AgentRuntime for MirrorRuntime {
    fn resolve_remote_environment(
        &self,
        name: &EnvironmentName,
    ) -> Result<EnvironmentHandle, SyncError> {
        let environment_dir = self.mirror_root.join(name.as_str());
        if !environment_dir.is_dir() {
            return Err(SyncError::EnvironmentResolution {
                environment: name.to_string(),
                reason: format!("not found in mirror {}", self.mirror_root.display()),
            });
        }

        Ok(EnvironmentHandle {
            name: name.clone(),
            source: Some(environment_dir.join("plugins")),
        })
    }

    fn download_plugins(
        &self,
        context: &SessionContext,
        environment: &EnvironmentHandle,
    ) -> Result<(), SyncError> {
        let download_error = |reason: String| SyncError::Download {
            environment: environment.name.to_string(),
            reason,
        };

        let dest = context
            .plugin_dest_dir()
            .ok_or_else(|| download_error("plugin destination is not configured".to_string()))?;
        let source = environment
            .source
            .clone()
            .unwrap_or_else(|| self.mirror_root.join(environment.name.as_str()).join("plugins"));
        let staging = dest.parent().unwrap_or(dest);

        fs::create_dir_all(dest)
            .map_err(|e| download_error(format!("create {}: {}", dest.display(), e)))?;

        let purged = purge_stale(&source, dest)
            .map_err(|e| download_error(format!("purge {}: {}", dest.display(), e)))?;
        let written = if source.is_dir() {
            sync_tree(&source, dest, staging)
                .map_err(|e| download_error(format!("sync from {}: {}", source.display(), e)))?
        } else {
            debug!(source = %source.display(), "Environment has no plugins");
            0
        };

        info!(
            environment = %environment.name,
            identity = %context.identity(),
            written,
            purged,
            "Downloaded plugins"
        );
        Ok(())
    }
}

/// Copy every entry of `source` into `dest`, replacing files atomically
fn sync_tree(source: &Path, dest: &Path, staging: &Path) -> io::Result<usize> {
    let mut written = 0;

    for entry in WalkDir::new(source).min_depth(1).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            sync_symlink(entry.path(), &target)?;
            written += 1;
        } else {
            let mut staged = tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .tempfile_in(staging)?;
            let mut reader = fs::File::open(entry.path())?;
            io::copy(&mut reader, staged.as_file_mut())?;
            let permissions = entry.metadata().map_err(io::Error::from)?.permissions();
            fs::set_permissions(staged.path(), permissions)?;
            staged.persist(&target).map_err(|e| e.error)?;
            written += 1;
        }
    }
    Ok(written)
}

#[cfg(unix)]
fn sync_symlink(source: &Path, target: &Path) -> io::Result<()> {
    let link = fs::read_link(source)?;
    if fs::read_link(target).ok().as_deref() == Some(link.as_path()) {
        return Ok(());
    }
    if fs::symlink_metadata(target).is_ok() {
        remove_entry(target)?;
    }
    match std::os::unix::fs::symlink(&link, target) {
        // Another session created the same link first
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if fs::read_link(target).ok().as_deref() == Some(link.as_path()) {
                Ok(())
            } else {
                Err(e)
            }
        }
        other => other,
    }
}

#[cfg(not(unix))]
fn sync_symlink(source: &Path, target: &Path) -> io::Result<()> {
    // Materialize links as regular copies where symlinks need privileges
    fs::copy(source, target).map(|_| ())
}

/// Remove entries of `dest` that are absent from `source` or changed kind
fn purge_stale(source: &Path, dest: &Path) -> io::Result<usize> {
    let mut stale = Vec::new();
    let mut walker = WalkDir::new(dest).min_depth(1).follow_links(false).into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.io_error().map(|io| io.kind()) == Some(io::ErrorKind::NotFound) => continue,
            Err(e) => return Err(e.into()),
        };
        let relative = entry
            .path()
            .strip_prefix(dest)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let is_dir = entry.file_type().is_dir();
        let keep = match fs::symlink_metadata(source.join(relative)) {
            Ok(meta) => meta.is_dir() == is_dir,
            Err(_) => false,
        };
        if !keep {
            if is_dir {
                walker.skip_current_dir();
            }
            stale.push(entry.into_path());
        }
    }

    for path in &stale {
        remove_entry(path)?;
    }
    Ok(stale.len())
}

fn remove_entry(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
