//! XDG and platform directory resolution.

use std::path::PathBuf;

const APPLICATION: &str = "plugin-cache";

/// Get XDG config home directory
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise `$HOME/.config`
pub fn config_home() -> Option<PathBuf> {
    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg_config_home.is_empty() {
            return Some(PathBuf::from(xdg_config_home));
        }
    }

    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config"))
}

/// Global config file: `$XDG_CONFIG_HOME/plugin-cache/config.toml`
pub fn global_config_file() -> Option<PathBuf> {
    config_home().map(|home| home.join(APPLICATION).join("config.toml"))
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APPLICATION)
}

/// Default cache root: the platform cache dir plus `environments`.
///
/// Falls back to the OS temp dir when no home directory is known.
pub fn default_cache_root() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join(APPLICATION))
        .join("environments")
}

/// Default log file under the platform state dir
pub fn default_log_file() -> Option<PathBuf> {
    let dirs = project_dirs()?;
    let base = dirs
        .state_dir()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| dirs.data_local_dir().to_path_buf());
    Some(base.join("plugin-cache.log"))
}
