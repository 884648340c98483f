//! Filesystem primitives used while holding the cache lock.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use walkdir::WalkDir;

/// A [`copy_tree`] failure, split by the side that failed
#[derive(Debug, Error)]
pub enum CopyError {
    /// Reading an entry of the source tree failed
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Creating or writing an entry of the destination failed
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn read_failed(path: &Path) -> impl FnOnce(io::Error) -> CopyError + '_ {
    move |source| CopyError::Read {
        path: path.to_path_buf(),
        source,
    }
}

fn write_failed(path: &Path) -> impl FnOnce(io::Error) -> CopyError + '_ {
    move |source| CopyError::Write {
        path: path.to_path_buf(),
        source,
    }
}

/// Recursively copy the contents of `src` into the existing directory `dst`.
///
/// Symbolic links are recreated as links, never followed. File permissions
/// are carried by `fs::copy`; directory permissions are applied after their
/// contents are written so read-only source directories still copy.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<(), CopyError> {
    let mut directories = Vec::new();

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            CopyError::Read {
                path,
                source: walk_error(e),
            }
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| read_failed(entry.path())(io::Error::new(io::ErrorKind::Other, e)))?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).map_err(read_failed(entry.path()))?;
            symlink(&link, entry.path(), &target).map_err(write_failed(&target))?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(write_failed(&target))?;
            let permissions = fs::metadata(entry.path())
                .map_err(read_failed(entry.path()))?
                .permissions();
            directories.push((target, permissions));
        } else {
            // Opening first pins read failures on the source
            fs::File::open(entry.path()).map_err(read_failed(entry.path()))?;
            fs::copy(entry.path(), &target).map_err(write_failed(&target))?;
        }
    }

    // Deepest first so restricting a parent never blocks its children
    for (dir, permissions) in directories.into_iter().rev() {
        fs::set_permissions(&dir, permissions).map_err(write_failed(&dir))?;
    }
    Ok(())
}

/// Give the owner full access to every directory below `dir`, inclusive, so
/// a tree copied with read-only directories can be removed.
///
/// Each directory is opened up before it is listed, so unreadable
/// directories are handled too. Links are not followed.
pub fn make_removable(dir: &Path) -> io::Result<()> {
    grant_owner_access(dir)?;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            make_removable(&entry.path())?;
        } else if cfg!(not(unix)) && file_type.is_file() {
            // Read-only files block deletion outside unix
            grant_owner_access(&entry.path())?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn grant_owner_access(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::symlink_metadata(path)?.permissions();
    let mode = permissions.mode();
    if mode & 0o700 != 0o700 {
        permissions.set_mode(mode | 0o700);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn grant_owner_access(path: &Path) -> io::Result<()> {
    let mut permissions = fs::symlink_metadata(path)?.permissions();
    if permissions.readonly() {
        permissions.set_readonly(false);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

/// Set the modification time of a file or directory to now
pub fn touch(path: &Path) -> io::Result<()> {
    let handle = open_for_times(path)?;
    handle.set_modified(SystemTime::now())
}

#[cfg(not(windows))]
fn open_for_times(path: &Path) -> io::Result<fs::File> {
    fs::File::open(path)
}

#[cfg(windows)]
fn open_for_times(path: &Path) -> io::Result<fs::File> {
    use std::os::windows::fs::OpenOptionsExt;
    const FILE_WRITE_ATTRIBUTES: u32 = 0x0100;
    const FILE_FLAG_BACKUP_SEMANTICS: u32 = 0x0200_0000;
    fs::OpenOptions::new()
        .access_mode(FILE_WRITE_ATTRIBUTES)
        .custom_flags(FILE_FLAG_BACKUP_SEMANTICS)
        .open(path)
}

#[cfg(unix)]
fn symlink(link: &Path, _source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link, target)
}

#[cfg(windows)]
fn symlink(link: &Path, source: &Path, target: &Path) -> io::Result<()> {
    if fs::metadata(source).map(|m| m.is_dir()).unwrap_or(false) {
        std::os::windows::fs::symlink_dir(link, target)
    } else {
        std::os::windows::fs::symlink_file(link, target)
    }
}

fn walk_error(err: walkdir::Error) -> io::Error {
    match err.into_io_error() {
        Some(io) => io,
        None => io::Error::new(io::ErrorKind::Other, "filesystem loop while walking tree"),
    }
}

/// Count regular files below `root`; zero when it does not exist
pub fn count_files(root: &Path) -> usize {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count()
}

/// Deterministic digest of a directory tree.
///
/// Covers relative paths, entry kinds, file bytes, and link targets in
/// file-name order. Two trees with the same digest are byte-identical.
pub fn tree_digest(root: &Path) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(walk_error)?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let relative = relative.to_string_lossy().replace('\\', "/");
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            hasher.update(b"L\0");
            hasher.update(relative.as_bytes());
            hasher.update(b"\0");
            hasher.update(fs::read_link(entry.path())?.to_string_lossy().as_bytes());
        } else if file_type.is_dir() {
            hasher.update(b"D\0");
            hasher.update(relative.as_bytes());
        } else {
            hasher.update(b"F\0");
            hasher.update(relative.as_bytes());
            hasher.update(b"\0");
            let content = fs::read(entry.path())?;
            hasher.update(&(content.len() as u64).to_le_bytes());
            hasher.update(&content);
        }
        hasher.update(b"\n");
    }

    Ok(hex::encode(hasher.finalize().as_bytes()))
}
