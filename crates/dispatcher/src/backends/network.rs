//! NetworkBackend - publishes batches on the message bus

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::{Duration, Instant};

use bus::Publisher;
use contracts::{ContractError, LogBackend, Record, Value};
use coordinator::{KvClient, KEY_ACTIVE_SESSION, KEY_NUM_CLIENTS};
use tracing::{debug, info, instrument, warn};

use super::parse_param;
use crate::DispatcherError;

/// Topic prefix of timeseries batches; the session name follows it
pub const TIMESERIES_PREFIX: &str = "/timeseries/";

const CLIENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for NetworkBackend
#[derive(Debug, Clone)]
pub struct NetworkBackendConfig {
    /// Broker frontend
    pub addr: SocketAddr,
    pub session: String,
}

impl NetworkBackendConfig {
    /// Create config from params map; `addr` and `session` override the
    /// given defaults
    pub fn from_params(
        backend: &str,
        params: &HashMap<String, String>,
        default_addr: SocketAddr,
        default_session: &str,
    ) -> Result<Self, DispatcherError> {
        let addr = parse_param(backend, params, "addr", default_addr)?;
        let session = params
            .get("session")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_session.to_string());
        Ok(Self { addr, session })
    }
}

/// Backend publishing each batch as one encoded message on
/// `/timeseries/<session>`
///
/// Delivery is fire-and-forget: a full publish queue drops the batch.
pub struct NetworkBackend {
    name: String,
    topic: String,
    session: String,
    publisher: Publisher,
    kv: Option<KvClient>,
}

impl NetworkBackend {
    #[instrument(name = "network_backend_connect", skip(name, config, kv), fields(addr = %config.addr))]
    pub async fn connect(
        name: impl Into<String>,
        config: NetworkBackendConfig,
        kv: Option<KvClient>,
    ) -> Result<Self, DispatcherError> {
        let name = name.into();
        let publisher = Publisher::connect(config.addr).await?;
        let topic = format!("{TIMESERIES_PREFIX}{}", config.session);
        info!(backend = %name, %topic, "NetworkBackend connected");
        Ok(Self {
            name,
            topic,
            session: config.session,
            publisher,
            kv,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// Wait until at least one realtime client is connected
    ///
    /// Returns `false` without a coordinator or when `timeout` elapses.
    pub async fn wait_for_client(&self, timeout: Duration) -> bool {
        match &self.kv {
            Some(kv) => wait_for_client(kv, timeout).await,
            None => {
                warn!(backend = %self.name, "No coordinator configured, not waiting for clients");
                false
            }
        }
    }

    /// Make this backend's session the one the gateway forwards
    pub async fn activate_session(&self) -> Result<(), DispatcherError> {
        let kv = self.kv.as_ref().ok_or_else(|| {
            DispatcherError::backend_creation(&self.name, "no coordinator configured")
        })?;
        kv.set(KEY_ACTIVE_SESSION, self.session.as_str()).await?;
        info!(backend = %self.name, session = %self.session, "Session activated");
        Ok(())
    }
}

/// Poll the client count every 100 ms until it is positive
///
/// A coordinator request that fails counts as zero clients.
pub async fn wait_for_client(kv: &KvClient, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        match kv.get(KEY_NUM_CLIENTS).await {
            Ok(Value::Int(n)) if n > 0 => {
                debug!(clients = n, "Realtime client connected");
                return true;
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Client count unavailable"),
        }
        if Instant::now() >= deadline {
            warn!(
                waited_ms = timeout.as_millis() as u64,
                "No realtime client connected"
            );
            return false;
        }
        tokio::time::sleep(CLIENT_POLL_INTERVAL).await;
    }
}

impl LogBackend for NetworkBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn log(&mut self, batch: &[Record]) -> Result<(), ContractError> {
        if self.publisher.is_closed() {
            return Err(ContractError::BackendClosed {
                backend: self.name.clone(),
            });
        }
        let payload =
            codec::encode(batch).map_err(|e| ContractError::backend_write(&self.name, e.to_string()))?;
        if !self.publisher.send(&self.topic, &payload) {
            debug!(backend = %self.name, records = batch.len(), "Publish queue full, batch dropped");
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), ContractError> {
        self.publisher.close();
        info!(backend = %self.name, "NetworkBackend closed");
        Ok(())
    }

    fn reset(&mut self, _target: Option<&Path>) -> Result<(), ContractError> {
        Ok(())
    }
}
