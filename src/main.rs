//! Evacuator daemon entry point.
//!
//! Thin wrapper: parse the one flag, load + validate configuration,
//! install logging, hand everything to the supervisor. Exit code 0 on
//! clean shutdown; non-zero when configuration is invalid, no provider is
//! detected, or no actions could be constructed.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use evacuator::{Config, Supervisor};

/// Per-node agent that evacuates workloads before cloud instance reclamation.
#[derive(Parser)]
#[command(name = "evacuator", version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file (optional; env vars and defaults apply
    /// either way).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            // logging is not up yet
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = evacuator::init_logging(&config.log) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match &cli.config {
        Some(path) if path.exists() => {
            info!(file = %path.display(), "loaded configuration from file");
        }
        Some(path) => {
            info!(
                file = %path.display(),
                "config file not found, using environment variables and defaults"
            );
        }
        None => {
            info!("no config file specified, using environment variables and defaults");
        }
    }

    match Supervisor::new(config).run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, label = e.as_label(), "startup failed");
            ExitCode::FAILURE
        }
    }
}
