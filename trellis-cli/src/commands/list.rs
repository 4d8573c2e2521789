//! List addins and their resolution status

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;

use super::{format_addin, load_config, native_engine};

#[derive(Args)]
pub struct ListArgs {
    /// Addin directory to scan instead of the configured ones (repeatable)
    #[arg(long = "dir")]
    pub dirs: Vec<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

/// Resolve (but do not start) every discovered addin
pub fn run(args: ListArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, &args.dirs)?;
    let dirs = config.addin_dirs.clone();
    let engine = native_engine(config);
    engine.initialize(false)?;

    let addins = engine.get_all_addins();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&addins)?);
        return Ok(());
    }

    if addins.is_empty() {
        println!("No addins found");
        println!();
        for dir in &dirs {
            println!("Addin directory: {}", dir.display());
        }
        println!();
        println!("To install an addin, create <dir>/<id>/addin.toml next to its library.");
        return Ok(());
    }

    for info in &addins {
        println!("{}", format_addin(info));
    }
    Ok(())
}
