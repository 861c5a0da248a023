//! Connected realtime clients

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use coordinator::{KvStore, KEY_NUM_CLIENTS};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use metrics::{counter, gauge};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

struct Client {
    peer: SocketAddr,
    sink: Arc<tokio::sync::Mutex<WsSink>>,
}

/// Client set shared by the accept loop and the broadcasters
///
/// Every insert and removal republishes the client count under
/// `websocket_num_clients` in the store.
pub struct ClientSet {
    next_id: AtomicU64,
    clients: Mutex<HashMap<u64, Client>>,
    store: KvStore,
}

impl ClientSet {
    pub fn new(store: KvStore) -> Self {
        let set = Self {
            next_id: AtomicU64::new(0),
            clients: Mutex::new(HashMap::new()),
            store,
        };
        set.store.set(KEY_NUM_CLIENTS, 0i64);
        set
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub(crate) fn insert(&self, peer: SocketAddr, sink: WsSink) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut clients = self.lock();
        clients.insert(
            id,
            Client {
                peer,
                sink: Arc::new(tokio::sync::Mutex::new(sink)),
            },
        );
        self.publish_count(clients.len());
        info!(%peer, clients = clients.len(), "Client connected");
        id
    }

    /// Returns whether the client was still present
    pub(crate) fn remove(&self, id: u64) -> bool {
        let mut clients = self.lock();
        let Some(client) = clients.remove(&id) else {
            return false;
        };
        self.publish_count(clients.len());
        info!(peer = %client.peer, clients = clients.len(), "Client disconnected");
        true
    }

    /// Send `payload` as one binary message to every client
    ///
    /// Works on a snapshot of the set. A client whose send fails is evicted
    /// and not retried. Returns the number of successful deliveries.
    pub async fn broadcast(&self, payload: Bytes) -> usize {
        let snapshot: Vec<_> = self
            .lock()
            .iter()
            .map(|(id, client)| (*id, client.peer, Arc::clone(&client.sink)))
            .collect();

        let mut delivered = 0;
        for (id, peer, sink) in snapshot {
            let sent = sink
                .lock()
                .await
                .send(Message::Binary(payload.clone()))
                .await;
            match sent {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(%peer, error = %e, "Send failed, evicting client");
                    if self.remove(id) {
                        counter!("gateway_clients_evicted_total").increment(1);
                    }
                }
            }
        }
        counter!("gateway_broadcast_delivered_total").increment(delivered as u64);
        delivered
    }

    /// Close every client connection and empty the set
    pub(crate) async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut clients = self.lock();
            let drained = clients.drain().map(|(_, client)| client).collect();
            self.publish_count(0);
            drained
        };
        for client in drained {
            let _ = client.sink.lock().await.close().await;
        }
    }

    fn publish_count(&self, count: usize) {
        self.store.set(KEY_NUM_CLIENTS, count as i64);
        gauge!("gateway_clients").set(count as f64);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Client>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
