//! TelemetryBlueprint - Config Loader output
//!
//! Describes the complete deployment: bus endpoints, coordinator, gateway,
//! logger cadence and the backend tree.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete pipeline blueprint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Message bus endpoints
    #[serde(default)]
    pub bus: BusConfig,

    /// Key-value coordinator
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Realtime gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Producer-side dispatcher
    #[serde(default)]
    pub logger: LoggerConfig,

    /// Root backends; more than one root is wrapped in a fan-out
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

/// Broker endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Publish-facing endpoint
    #[serde(default = "default_frontend_addr")]
    pub frontend_addr: SocketAddr,

    /// Subscribe-facing endpoint
    #[serde(default = "default_backend_addr")]
    pub backend_addr: SocketAddr,

    /// Per-subscriber queue depth inside the broker
    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            frontend_addr: default_frontend_addr(),
            backend_addr: default_backend_addr(),
            subscriber_queue: default_subscriber_queue(),
        }
    }
}

fn default_frontend_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5555))
}

fn default_backend_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5556))
}

fn default_subscriber_queue() -> usize {
    1024
}

/// Coordinator endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_coordinator_addr")]
    pub addr: SocketAddr,

    /// Client request timeout (ms)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            addr: default_coordinator_addr(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_coordinator_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5557))
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Realtime gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_gateway_addr(),
        }
    }
}

fn default_gateway_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5678))
}

/// Producer-side dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Batch flush cadence (ms)
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Session name used for the timeseries topic
    #[serde(default = "default_session")]
    pub session: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            session: default_session(),
        }
    }
}

fn default_flush_interval_ms() -> u64 {
    10
}

fn default_session() -> String {
    "default".to_string()
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend name
    pub name: String,

    /// Backend type
    pub backend_type: BackendType,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,

    /// Child backends receiving the same batches
    #[serde(default)]
    pub children: Vec<BackendConfig>,
}

/// Backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// Compressed log file
    File,
    /// Publish on the message bus
    Network,
    /// Isolated worker owning its children
    OutOfProcess,
    /// Batch summaries through tracing
    Log,
}

impl BackendConfig {
    /// Look up a parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}
