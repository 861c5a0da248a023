//! Command implementations.

mod dump;
mod record;
mod serve;
mod validate;

pub use dump::run_dump;
pub use record::run_record;
pub use serve::run_serve;
pub use validate::run_validate;

use std::path::Path;

use anyhow::{Context, Result};
use contracts::TelemetryBlueprint;
use tracing::{info, warn};

/// Load a configuration file, or the defaults when none is given
fn load_blueprint(path: Option<&Path>) -> Result<TelemetryBlueprint> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            info!(config = %path.display(), "Loading configuration");
            config_loader::ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => {
            info!("No configuration file given, using defaults");
            Ok(TelemetryBlueprint::default())
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
