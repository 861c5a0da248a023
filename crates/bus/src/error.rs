//! Bus error types

use std::net::SocketAddr;

use thiserror::Error;

/// Message bus errors
#[derive(Debug, Error)]
pub enum BusError {
    /// Listener could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Connection to the broker failed
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Malformed message on the wire
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Declared frame length above the limit
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// Broker did not answer in time
    #[error("timed out after {timeout_ms}ms waiting for {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Operation on a closed endpoint
    #[error("bus endpoint closed")]
    Closed,

    /// IO error on an established connection
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BusError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}
