//! `serve` command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use bus::Broker;
use contracts::Value;
use coordinator::{KvServer, KvStore, KEY_ACTIVE_SESSION};
use gateway::FanoutGateway;
use tracing::{info, warn};

use super::{load_blueprint, shutdown_signal};
use crate::cli::ServeArgs;

/// Execute the `serve` command
pub async fn run_serve(args: &ServeArgs) -> Result<()> {
    let blueprint = load_blueprint(args.config.as_deref())?;

    let broker = Broker::bind(&blueprint.bus)
        .await
        .context("Failed to start message bus")?
        .spawn()?;

    let store = KvStore::new();
    store.set(
        KEY_ACTIVE_SESSION,
        args.session.clone().map_or(Value::Null, Value::from),
    );
    store.on_update(Arc::new(|key: &str, value: &Value| {
        if key == KEY_ACTIVE_SESSION {
            info!(session = ?value.as_str(), "Active session changed");
        }
    }));

    let kv_server = KvServer::bind(blueprint.coordinator.addr, store.clone())
        .await
        .context("Failed to start coordinator")?
        .spawn()?;

    let mut gateway = FanoutGateway::bind(&blueprint.gateway, store.clone())
        .await
        .context("Failed to start gateway")?
        .spawn()?;
    gateway
        .attach_bus(broker.backend_addr())
        .await
        .context("Failed to attach gateway to the bus")?;

    info!(
        frontend = %broker.frontend_addr(),
        backend = %broker.backend_addr(),
        coordinator = %kv_server.addr(),
        gateway = %gateway.addr(),
        "Serving (Ctrl+C to stop)"
    );

    shutdown_signal().await;
    warn!("Received shutdown signal, stopping...");

    gateway.shutdown().await;
    kv_server.shutdown().await;
    broker.shutdown().await;

    info!("Telemetry services stopped");
    Ok(())
}
