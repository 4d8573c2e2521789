pub mod config;
pub mod list;
pub mod start;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use trellis_core::{AddinEngine, AddinInfo, AddinStatus, EngineConfig, NativeLoader};

/// Load the engine config, honoring `--config` and any `--dir` overrides
pub fn load_config(path: Option<&Path>, dirs: &[PathBuf]) -> Result<EngineConfig> {
    let path = path.map_or_else(EngineConfig::default_path, Path::to_path_buf);
    let mut config = EngineConfig::load(&path)?;
    if !dirs.is_empty() {
        config.addin_dirs = dirs.to_vec();
    }
    Ok(config)
}

/// Engine backed by native dynamic libraries
pub fn native_engine(config: EngineConfig) -> AddinEngine {
    AddinEngine::new(config, Arc::new(NativeLoader::new()))
}

/// One line per addin: status marker, id, version, failure reason
pub fn format_addin(info: &AddinInfo) -> String {
    let marker = match info.status {
        AddinStatus::Started => "✓",
        AddinStatus::Failed => "✗",
        _ => "○",
    };
    let mut line = format!("{} {} v{}    {}", marker, info.id, info.version, info.status);
    if let Some(failure) = &info.failure {
        line.push_str(&format!(" ({})", failure.message));
    }
    line
}
