//! Publisher - fire-and-forget sends to the broker frontend

use std::net::SocketAddr;

use bytes::Bytes;
use metrics::counter;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::message::BusMessage;
use crate::BusError;

/// Default depth of the outgoing queue
pub const DEFAULT_PUBLISH_QUEUE: usize = 1024;

/// Connected publisher
///
/// `send` never blocks: messages go to a bounded queue drained by a writer
/// task, and are dropped when the queue is full.
pub struct Publisher {
    addr: SocketAddr,
    tx: Option<mpsc::Sender<Bytes>>,
    writer: Option<JoinHandle<()>>,
}

impl Publisher {
    pub async fn connect(addr: SocketAddr) -> Result<Self, BusError> {
        Self::connect_with_capacity(addr, DEFAULT_PUBLISH_QUEUE).await
    }

    #[instrument(name = "publisher_connect", skip(capacity))]
    pub async fn connect_with_capacity(
        addr: SocketAddr,
        capacity: usize,
    ) -> Result<Self, BusError> {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|source| BusError::Connect { addr, source })?;
        let _ = stream.set_nodelay(true);

        let (tx, mut rx) = mpsc::channel::<Bytes>(capacity.max(1));
        let writer = tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                if let Err(e) = stream.write_all(&bytes).await {
                    warn!(%addr, error = %e, "Publisher connection lost");
                    return;
                }
            }
            let _ = stream.shutdown().await;
            debug!(%addr, "Publisher writer finished");
        });

        debug!(%addr, "Publisher connected");
        Ok(Self {
            addr,
            tx: Some(tx),
            writer: Some(writer),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queue `[topic, payload]`; returns whether the message was queued
    pub fn send(&self, topic: &str, payload: &[u8]) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        let bytes = BusMessage::new(topic, Bytes::copy_from_slice(payload)).encode();
        match tx.try_send(bytes) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                counter!("bus_publish_dropped_total").increment(1);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_none_or(|tx| tx.is_closed())
    }

    /// Stop accepting sends; queued messages are still written
    pub fn close(&mut self) {
        if self.tx.take().is_some() {
            debug!(addr = %self.addr, "Publisher closed");
        }
    }

    /// Close and wait until every queued message has been written
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("addr", &self.addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}
