//! # Observability
//!
//! Logging and Prometheus metrics for the telemetry pipeline processes.
//!
//! Logs go to stderr so `dump` output on stdout stays clean. `RUST_LOG`
//! overrides the verbosity chosen on the command line.
//!
//! ```ignore
//! observability::init_with_config(ObservabilityConfig::default().with_verbosity(1, false))?;
//!
//! let mut stats = observability::RecordStatsAggregator::new();
//! stats.update(&batch);
//! println!("{}", stats.summary());
//! ```

pub mod metrics;

use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

pub use crate::metrics::{
    record_batch_metrics, RecordStatsAggregator, RunningStats, StatsSummary, StreamSummary,
};

/// Websocket handshake and frame chatter is only useful when chasing a gateway bug
const QUIET_TARGETS: &str = "tungstenite=warn,tokio_tungstenite=warn";

pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus scrape endpoint, disabled when `None`
    pub metrics_addr: Option<SocketAddr>,
    /// Filter directives used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_addr: None,
            default_filter: format!("info,{QUIET_TARGETS}"),
        }
    }
}

impl ObservabilityConfig {
    pub fn with_log_format(mut self, log_format: LogFormat) -> Self {
        self.log_format = log_format;
        self
    }

    /// `-v` count and `--quiet` to a default filter; quiet wins
    pub fn with_verbosity(mut self, verbose: u8, quiet: bool) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        };
        self.default_filter = format!("{level},{QUIET_TARGETS}");
        self
    }

    /// Serve metrics on all interfaces at `port`
    pub fn with_metrics_port(mut self, port: Option<u16>) -> Self {
        self.metrics_addr = port.map(|port| SocketAddr::from(([0, 0, 0, 0], port)));
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    /// Multi-line, for a developer terminal
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!(
                "unknown log format '{other}' (expected json, pretty or compact)"
            )),
        }
    }
}

pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = build_filter(&config.default_filter)?;

    tracing_subscriber::registry()
        .with(fmt_layer(config.log_format))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(addr) = config.metrics_addr {
        install_metrics_exporter(addr)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        metrics_addr = ?config.metrics_addr,
        filter = %config.default_filter,
        "Observability initialized"
    );
    Ok(())
}

/// Install the Prometheus recorder and describe the pipeline's metrics
pub fn install_metrics_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("Failed to install Prometheus exporter on {addr}"))?;
    describe_metrics();

    tracing::info!(%addr, "Prometheus metrics endpoint initialized");
    Ok(())
}

/// Register help text and units for every metric the pipeline emits
pub fn describe_metrics() {
    use ::metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

    describe_counter!(
        "bus_messages_published_total",
        Unit::Count,
        "Messages accepted by the broker frontend"
    );
    describe_counter!(
        "bus_messages_dropped_total",
        Unit::Count,
        "Deliveries dropped because a subscriber queue was full"
    );
    describe_counter!(
        "bus_publish_dropped_total",
        Unit::Count,
        "Messages a publisher dropped before reaching the broker"
    );
    describe_counter!(
        "telemetry_records_enqueued_total",
        Unit::Count,
        "Records queued by the dispatcher"
    );
    describe_counter!(
        "telemetry_batches_flushed_total",
        Unit::Count,
        "Batches handed to a backend, by backend"
    );
    describe_histogram!(
        "telemetry_batch_size",
        Unit::Count,
        "Records per flushed batch, by backend"
    );
    describe_counter!(
        "telemetry_backend_failures_total",
        Unit::Count,
        "Backend write failures, by backend"
    );
    describe_gauge!("gateway_clients", Unit::Count, "Connected websocket clients");
    describe_counter!(
        "gateway_clients_evicted_total",
        Unit::Count,
        "Websocket clients dropped for falling behind"
    );
    describe_counter!(
        "gateway_broadcast_delivered_total",
        Unit::Count,
        "Bus messages delivered to websocket clients"
    );
    describe_counter!(
        "telemetry_records_total",
        Unit::Count,
        "Records seen in a stream, by source and kind"
    );
    describe_histogram!(
        "telemetry_stream_batch_size",
        Unit::Count,
        "Records per decoded batch, by source"
    );
}

fn build_filter(default_filter: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .with_context(|| format!("Invalid log filter '{default_filter}'"))
}

fn fmt_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = fmt::layer().with_writer(std::io::stderr);
    match format {
        LogFormat::Json => layer
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}
