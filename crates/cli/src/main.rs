//! # Telemetry CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - `serve`: broker, coordinator and realtime gateway in one process
//! - `record`: demo producer through the configured backends
//! - `dump`: log file inspection
//! - `validate`: configuration checks

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::debug;

use cli::{Cli, Commands};
use commands::{run_dump, run_record, run_serve, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli)?;

    debug!(version = env!("CARGO_PKG_VERSION"), "Telemetry CLI starting");

    let result = match &cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Record(args) => run_record(args).await,
        Commands::Dump(args) => run_dump(args),
        Commands::Validate(args) => run_validate(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
fn init_logging(cli: &Cli) -> Result<()> {
    let config = ObservabilityConfig::default()
        .with_log_format(cli.log_format.into())
        .with_verbosity(cli.verbose, cli.quiet)
        .with_metrics_port(cli.metrics_port);
    observability::init_with_config(config)
}
