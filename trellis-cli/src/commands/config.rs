use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};
use trellis_core::EngineConfig;

use super::load_config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Show configuration and data paths
    Path,
    /// Write the default configuration if none exists
    Init,
}

pub fn run(args: ConfigArgs, config_path: Option<&Path>) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(config_path),
        ConfigCommands::Path => show_paths(config_path),
        ConfigCommands::Init => init_config(config_path),
    }
}

fn show_config(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, &[])?;
    println!("{}", config.to_toml()?);
    Ok(())
}

fn show_paths(config_path: Option<&Path>) -> Result<()> {
    let config = config_path.map_or_else(EngineConfig::default_path, Path::to_path_buf);
    println!("Config:  {:?}", config);
    println!("Addins:  {:?}", trellis_paths::addins_dir());
    println!("Shadow:  {:?}", trellis_paths::shadow_copy_dir());
    Ok(())
}

fn init_config(config_path: Option<&Path>) -> Result<()> {
    let path = config_path.map_or_else(EngineConfig::default_path, Path::to_path_buf);
    if path.exists() {
        println!("Config already exists: {}", path.display());
        return Ok(());
    }
    EngineConfig::default().save(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_writes_loadable_config_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");

        init_config(Some(&path)).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), EngineConfig::default());

        std::fs::write(&path, "start_automatically = false\n").unwrap();
        init_config(Some(&path)).unwrap();
        assert_ne!(std::fs::read_to_string(&path).unwrap(), written);
    }
}
