//! XDG Base Directory paths for trellis.
//!
//! CLI tools should use XDG paths for cross-platform consistency,
//! not platform-native paths.

use std::path::PathBuf;

fn xdg_dir(var: &str, fallback: &str) -> PathBuf {
    if let Ok(xdg) = std::env::var(var) {
        PathBuf::from(xdg).join("trellis")
    } else if let Some(home) = dirs::home_dir() {
        home.join(fallback).join("trellis")
    } else {
        PathBuf::from(fallback).join("trellis")
    }
}

/// Get the trellis config directory.
///
/// Returns `$XDG_CONFIG_HOME/trellis` if set, otherwise `~/.config/trellis`.
/// This is where `config.toml` lives.
///
/// # Examples
///
/// ```
/// use trellis_paths::config_dir;
///
/// let config = config_dir().join("config.toml");
/// ```
pub fn config_dir() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
}

/// Get the trellis data directory.
///
/// Returns `$XDG_DATA_HOME/trellis` if set, otherwise `~/.local/share/trellis`.
/// Installed addins live under `addins/` here by default.
pub fn data_dir() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share")
}

/// Get the trellis cache directory.
///
/// Returns `$XDG_CACHE_HOME/trellis` if set, otherwise `~/.cache/trellis`.
pub fn cache_dir() -> PathBuf {
    xdg_dir("XDG_CACHE_HOME", ".cache")
}

/// Default location for shadow copies of addin code units.
///
/// Engine-managed scratch space; its contents are not a format contract.
pub fn shadow_copy_dir() -> PathBuf {
    cache_dir().join("shadow")
}

/// Default addin scan root.
pub fn addins_dir() -> PathBuf {
    data_dir().join("addins")
}
