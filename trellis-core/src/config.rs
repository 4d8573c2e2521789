//! Engine configuration
//!
//! Stored as TOML in `~/.config/trellis/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::loading::LoadMethod;

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directories scanned for addins; every sub-directory is one addin
    pub addin_dirs: Vec<PathBuf>,
    /// Start addins as part of `initialize`
    pub start_automatically: bool,
    /// Capacity of the status event broadcast channel
    pub event_capacity: usize,
    pub loading: LoadingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            addin_dirs: vec![trellis_paths::addins_dir()],
            start_automatically: true,
            event_capacity: 256,
            loading: LoadingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    ///
    /// Returns the default configuration if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent().filter(|p| !p.exists()) {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        trellis_paths::config_dir().join("config.toml")
    }
}

/// Module loading policy options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadingConfig {
    /// Copy code units to a private working directory before loading, so the
    /// deployed files are never locked and can be replaced while running
    pub shadow_copy_enabled: bool,
    pub shadow_copy_directory: PathBuf,
    /// Searched in order for code units an addin references
    pub probing_directories: Vec<PathBuf>,
    /// Load method used unless a host selector decides otherwise
    pub default_method: LoadMethod,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            shadow_copy_enabled: false,
            shadow_copy_directory: trellis_paths::shadow_copy_dir(),
            probing_directories: Vec::new(),
            default_method: LoadMethod::FileBacked,
        }
    }
}
