//! Broker - forwards published messages to prefix-matching subscribers
//!
//! ```text
//! Publisher ──┐                       ┌──▶ Subscriber ("/camera/")
//!             ├─▶ frontend ─▶ route ──┤
//! Publisher ──┘                       └──▶ Subscriber ("/timeseries/")
//! ```
//!
//! Delivery is at-most-once: every subscriber owns a bounded queue and a
//! message that does not fit is dropped for that subscriber only.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use contracts::BusConfig;
use metrics::counter;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::message::BusMessage;
use crate::wire::{encode_message, read_message, SUBSCRIBE, SUBSCRIBED};
use crate::BusError;

struct SubscriberSlot {
    prefixes: Vec<Bytes>,
    tx: mpsc::Sender<Bytes>,
}

/// Live subscriber connections
#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    slots: Mutex<HashMap<u64, SubscriberSlot>>,
}

/// Outcome of routing one message
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct RouteStats {
    delivered: usize,
    dropped: usize,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, SubscriberSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, tx: mpsc::Sender<Bytes>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(
            id,
            SubscriberSlot {
                prefixes: Vec::new(),
                tx,
            },
        );
        id
    }

    /// Add a prefix and queue the acknowledgement under the same lock, so the
    /// ack precedes every message routed through the new prefix.
    fn subscribe(&self, id: u64, prefix: Bytes) {
        let mut slots = self.lock();
        if let Some(slot) = slots.get_mut(&id) {
            let ack = encode_message(&[SUBSCRIBED, &prefix[..]]);
            slot.prefixes.push(prefix);
            if slot.tx.try_send(ack).is_err() {
                warn!(subscriber = id, "Subscription ack dropped, queue full");
            }
        }
    }

    fn remove(&self, id: u64) {
        self.lock().remove(&id);
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn route(&self, message: &BusMessage) -> RouteStats {
        let mut stats = RouteStats::default();
        let mut encoded: Option<Bytes> = None;

        for slot in self.lock().values() {
            if !slot.prefixes.iter().any(|p| message.matches(p)) {
                continue;
            }
            let bytes = encoded.get_or_insert_with(|| message.encode()).clone();
            match slot.tx.try_send(bytes) {
                Ok(()) => stats.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => stats.dropped += 1,
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        stats
    }
}

/// Bound but not yet running broker
pub struct Broker {
    frontend: TcpListener,
    backend: TcpListener,
    queue_capacity: usize,
}

impl Broker {
    /// Bind both endpoints; failure to bind either is fatal
    #[instrument(name = "broker_bind", skip(config), fields(frontend = %config.frontend_addr, backend = %config.backend_addr))]
    pub async fn bind(config: &BusConfig) -> Result<Self, BusError> {
        let frontend = TcpListener::bind(config.frontend_addr)
            .await
            .map_err(|source| BusError::Bind {
                addr: config.frontend_addr,
                source,
            })?;
        let backend = TcpListener::bind(config.backend_addr)
            .await
            .map_err(|source| BusError::Bind {
                addr: config.backend_addr,
                source,
            })?;

        Ok(Self {
            frontend,
            backend,
            queue_capacity: config.subscriber_queue.max(1),
        })
    }

    pub fn frontend_addr(&self) -> Result<SocketAddr, BusError> {
        Ok(self.frontend.local_addr()?)
    }

    pub fn backend_addr(&self) -> Result<SocketAddr, BusError> {
        Ok(self.backend.local_addr()?)
    }

    /// Start the accept loops; the returned handle reports ready once both run
    pub fn spawn(self) -> Result<BrokerHandle, BusError> {
        let frontend_addr = self.frontend_addr()?;
        let backend_addr = self.backend_addr()?;
        let registry = Arc::new(Registry::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let frontend_task = tokio::spawn(accept_publishers(
            self.frontend,
            Arc::clone(&registry),
            shutdown_rx.clone(),
        ));
        let backend_task = tokio::spawn(accept_subscribers(
            self.backend,
            Arc::clone(&registry),
            self.queue_capacity,
            shutdown_rx,
        ));

        let ready = Arc::new(AtomicBool::new(true));
        info!(%frontend_addr, %backend_addr, "Broker ready");

        Ok(BrokerHandle {
            frontend_addr,
            backend_addr,
            registry,
            ready,
            shutdown_tx,
            tasks: vec![frontend_task, backend_task],
        })
    }
}

/// Handle to a running broker
pub struct BrokerHandle {
    frontend_addr: SocketAddr,
    backend_addr: SocketAddr,
    registry: Arc<Registry>,
    ready: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl BrokerHandle {
    pub fn frontend_addr(&self) -> SocketAddr {
        self.frontend_addr
    }

    pub fn backend_addr(&self) -> SocketAddr {
        self.backend_addr
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Connected subscriber sockets
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Stop accepting and close every connection
    pub async fn shutdown(self) {
        self.ready.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Broker stopped");
    }
}

async fn accept_publishers(
    listener: TcpListener,
    registry: Arc<Registry>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!(%peer, "Publisher connected");
                tokio::spawn(serve_publisher(
                    stream,
                    peer,
                    Arc::clone(&registry),
                    shutdown.clone(),
                ));
            }
            Err(e) => warn!(error = %e, "Frontend accept failed"),
        }
    }
}

async fn accept_subscribers(
    listener: TcpListener,
    registry: Arc<Registry>,
    capacity: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!(%peer, "Subscriber connected");
                tokio::spawn(serve_subscriber(
                    stream,
                    peer,
                    Arc::clone(&registry),
                    capacity,
                    shutdown.clone(),
                ));
            }
            Err(e) => warn!(error = %e, "Backend accept failed"),
        }
    }
}

async fn serve_publisher(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<Registry>,
    mut shutdown: watch::Receiver<bool>,
) {
    let _ = stream.set_nodelay(true);
    let mut reader = BufReader::new(stream);

    loop {
        let frames = tokio::select! {
            _ = shutdown.changed() => break,
            frames = read_message(&mut reader) => frames,
        };
        let message = match frames {
            Ok(Some(frames)) => match BusMessage::from_frames(frames) {
                Ok(message) => message,
                Err(e) => {
                    warn!(%peer, error = %e, "Dropping publisher connection");
                    break;
                }
            },
            Ok(None) => break,
            Err(e) => {
                debug!(%peer, error = %e, "Publisher connection ended");
                break;
            }
        };

        let stats = registry.route(&message);
        counter!("bus_messages_published_total").increment(1);
        if stats.dropped > 0 {
            counter!("bus_messages_dropped_total").increment(stats.dropped as u64);
            debug!(topic = %message.topic, dropped = stats.dropped, "Subscriber queue full");
        }
    }
    debug!(%peer, "Publisher disconnected");
}

async fn serve_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<Registry>,
    capacity: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let _ = stream.set_nodelay(true);
    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<Bytes>(capacity);
    let id = registry.register(tx);

    let writer = tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut reader = BufReader::new(read_half);
    loop {
        let frames = tokio::select! {
            _ = shutdown.changed() => break,
            frames = read_message(&mut reader) => frames,
        };
        match frames {
            Ok(Some(frames)) if frames.len() == 2 && frames[0] == SUBSCRIBE => {
                debug!(%peer, prefix = %String::from_utf8_lossy(&frames[1]), "Subscribed");
                registry.subscribe(id, frames[1].clone());
            }
            Ok(Some(frames)) => {
                warn!(%peer, frames = frames.len(), "Ignoring unexpected subscriber message");
            }
            Ok(None) => break,
            Err(e) => {
                debug!(%peer, error = %e, "Subscriber connection ended");
                break;
            }
        }
    }

    registry.remove(id);
    if *shutdown.borrow() {
        writer.abort();
    }
    debug!(%peer, "Subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(topic: &str) -> BusMessage {
        BusMessage::new(topic.to_string(), Bytes::from_static(b"p"))
    }

    #[test]
    fn test_route_by_prefix() {
        let registry = Registry::default();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let a = registry.register(tx_a);
        let b = registry.register(tx_b);
        registry.subscribe(a, Bytes::from_static(b"/camera/"));
        registry.subscribe(b, Bytes::from_static(b"/timeseries/"));

        // acks first
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());

        let stats = registry.route(&message("/camera/front"));
        assert_eq!(stats, RouteStats { delivered: 1, dropped: 0 });
        assert_eq!(rx_a.try_recv().unwrap(), message("/camera/front").encode());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_drops_for_that_subscriber_only() {
        let registry = Registry::default();
        let (tx_slow, _rx_slow) = mpsc::channel(1);
        let (tx_fast, mut rx_fast) = mpsc::channel(16);
        let slow = registry.register(tx_slow);
        let fast = registry.register(tx_fast);
        registry.subscribe(slow, Bytes::new()); // ack fills the queue
        registry.subscribe(fast, Bytes::new());
        let _ = rx_fast.try_recv();

        let stats = registry.route(&message("/x"));
        assert_eq!(stats, RouteStats { delivered: 1, dropped: 1 });
        assert!(rx_fast.try_recv().is_ok());
    }

    #[test]
    fn test_removed_subscriber_receives_nothing() {
        let registry = Registry::default();
        let (tx, _rx) = mpsc::channel(4);
        let id = registry.register(tx);
        registry.subscribe(id, Bytes::new());
        registry.remove(id);
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.route(&message("/x")), RouteStats::default());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = BusConfig {
            frontend_addr: taken.local_addr().unwrap(),
            backend_addr: "127.0.0.1:0".parse().unwrap(),
            subscriber_queue: 8,
        };
        assert!(matches!(
            Broker::bind(&config).await,
            Err(BusError::Bind { .. })
        ));
    }
}
