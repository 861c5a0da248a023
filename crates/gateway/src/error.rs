//! Gateway error types

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Listener could not be bound
    #[error("failed to bind gateway on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// WebSocket handshake or transport failure
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("bus error: {0}")]
    Bus(#[from] bus::BusError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
