mod cli;
mod engine;
mod error;
mod model;
mod orchestrator;
mod overlay;
#[cfg(feature = "tui")]
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Log to a file in the work directory; the terminal belongs to the UI.
fn init_logging(path: &Path) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let cfg = cli::build_config(&args)?;
    init_logging(&cfg.log_file())?;
    tracing::info!(work_dir = %cfg.work_dir.display(), "starting kraken-tui");

    match cli::run(args, cfg).await {
        Ok(()) => {
            // A worker may still be blocked on an external process after the UI quits;
            // exit without waiting on the blocking pool.
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "exiting with error");
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
