//! Coordinator client

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use contracts::{CoordinatorConfig, Value};
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::debug;

use bus::wire::{read_message, write_message};

use crate::server::{GET, OK, SET};
use crate::CoordinatorError;

/// Client for a [`KvServer`](crate::KvServer)
///
/// Every request opens a fresh connection. A request that gets no reply
/// within `timeout` fails with [`CoordinatorError::Timeout`]; a timed-out
/// `set` may still have been applied.
#[derive(Debug, Clone)]
pub struct KvClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl KvClient {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(config.addr, Duration::from_millis(config.timeout_ms))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current value of `name`, `Null` when unset
    pub async fn get(&self, name: &str) -> Result<Value, CoordinatorError> {
        let reply = self.request("get", &[GET, name.as_bytes()]).await?;
        Ok(codec::decode_value(&reply)?)
    }

    pub async fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), CoordinatorError> {
        let encoded = codec::encode_value(&value.into())?;
        let reply = self
            .request("set", &[SET, name.as_bytes(), &encoded[..]])
            .await?;
        if &reply[..] != OK {
            return Err(CoordinatorError::protocol(format!(
                "unexpected reply to set '{name}'"
            )));
        }
        Ok(())
    }

    /// Handle bound to one key
    pub fn remote(&self, name: impl Into<String>) -> RemoteValue {
        RemoteValue {
            client: self.clone(),
            name: name.into(),
        }
    }

    async fn request(&self, operation: &str, frames: &[&[u8]]) -> Result<Bytes, CoordinatorError> {
        match tokio::time::timeout(self.timeout, self.round_trip(frames)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(addr = %self.addr, operation, "Coordinator request timed out");
                Err(CoordinatorError::timeout(
                    format!("coordinator {operation}"),
                    self.timeout.as_millis() as u64,
                ))
            }
        }
    }

    async fn round_trip(&self, frames: &[&[u8]]) -> Result<Bytes, CoordinatorError> {
        let stream = TcpStream::connect(self.addr)
            .await
            .map_err(|source| CoordinatorError::Connect {
                addr: self.addr,
                source,
            })?;
        let _ = stream.set_nodelay(true);
        let (read_half, mut write_half) = stream.into_split();

        write_message(&mut write_half, frames).await?;

        let mut reader = BufReader::new(read_half);
        let mut reply = read_message(&mut reader)
            .await?
            .ok_or_else(|| CoordinatorError::protocol("connection closed before reply"))?;
        if reply.len() != 1 {
            return Err(CoordinatorError::protocol(format!(
                "expected single-frame reply, got {} frames",
                reply.len()
            )));
        }
        Ok(reply.remove(0))
    }
}

/// A single remote key
#[derive(Debug, Clone)]
pub struct RemoteValue {
    client: KvClient,
    name: String,
}

impl RemoteValue {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self) -> Result<Value, CoordinatorError> {
        self.client.get(&self.name).await
    }

    pub async fn set(&self, value: impl Into<Value>) -> Result<(), CoordinatorError> {
        self.client.set(&self.name, value).await
    }
}
