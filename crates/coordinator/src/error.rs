//! Coordinator error types

use std::net::SocketAddr;

use thiserror::Error;

/// Key-value coordination errors
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// No reply within the client timeout; the request may still have
    /// been applied
    #[error("{operation} timed out after {waited_ms}ms")]
    Timeout { operation: String, waited_ms: u64 },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Reply did not follow the request/reply contract
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("value codec error: {0}")]
    Codec(#[from] codec::CodecError),

    #[error("transport error: {0}")]
    Transport(#[from] bus::BusError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoordinatorError {
    pub fn timeout(operation: impl Into<String>, waited_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            waited_ms,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<CoordinatorError> for contracts::ContractError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::Timeout {
                operation,
                waited_ms,
            } => contracts::ContractError::timeout(operation, waited_ms),
            other => contracts::ContractError::backend_connection("coordinator", other.to_string()),
        }
    }
}
