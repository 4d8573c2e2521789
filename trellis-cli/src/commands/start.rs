//! Run an addin host in the foreground

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tokio::sync::broadcast::error::RecvError;
use trellis_core::RootNode;

use super::{format_addin, load_config, native_engine};

#[derive(Args)]
pub struct StartArgs {
    /// Addin directory to scan instead of the configured ones (repeatable)
    #[arg(long = "dir")]
    pub dirs: Vec<PathBuf>,

    /// Bind an empty root to this extension point and report what attaches
    #[arg(long = "point")]
    pub points: Vec<String>,

    /// Keep addins running until Ctrl-C
    #[arg(long)]
    pub wait: bool,
}

pub async fn run(args: StartArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, &args.dirs)?;
    let start_automatically = config.start_automatically;
    let engine = native_engine(config);

    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{event}"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Status event printer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // points are loaded before anything starts so every contribution is seen
    engine.initialize(false)?;

    let mut roots = Vec::new();
    for name in &args.points {
        let point = Arc::new(engine.extension_point(name.as_str()));
        let root = Arc::new(RootNode::new());
        point.bind(root.clone())?;
        engine.load_extension_point(point)?;
        roots.push((name.clone(), root));
    }

    if start_automatically {
        engine.start()?;
    } else {
        tracing::info!("start_automatically is off; addins resolved but not started");
    }

    for info in engine.get_all_addins() {
        println!("{}", format_addin(&info));
    }
    for (name, root) in &roots {
        println!("{}: {} extension(s)", name, root.children().len());
    }

    if args.wait {
        println!("Running, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
    }

    engine.stop()?;
    drop(engine);
    printer.await?;
    Ok(())
}
