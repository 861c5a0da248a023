//! FanoutGateway - WebSocket server for realtime clients
//!
//! ```text
//! broker backend ──▶ Subscriber(/camera/, /timeseries/, /session/)
//!                        │ arrival order
//!                        ▼
//!                  SessionFilter ──▶ ClientSet::broadcast ──▶ WebSocket clients
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bus::{BusMessage, Subscriber};
use bytes::Bytes;
use contracts::{GatewayConfig, Value};
use coordinator::{KvStore, KEY_ACTIVE_SESSION};
use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use crate::clients::ClientSet;
use crate::filter::{SessionFilter, CAMERA_PREFIX, SESSION_PREFIX, TIMESERIES_PREFIX};
use crate::GatewayError;

/// Bound but not yet running gateway
pub struct FanoutGateway {
    listener: TcpListener,
    clients: Arc<ClientSet>,
}

impl FanoutGateway {
    #[instrument(name = "gateway_bind", skip_all, fields(addr = %config.bind_addr))]
    pub async fn bind(config: &GatewayConfig, store: KvStore) -> Result<Self, GatewayError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        Ok(Self {
            listener,
            clients: Arc::new(ClientSet::new(store)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, GatewayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the accept loop
    pub fn spawn(self) -> Result<GatewayHandle, GatewayError> {
        let addr = self.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept = tokio::spawn(accept_clients(
            self.listener,
            Arc::clone(&self.clients),
            shutdown_rx,
        ));
        info!(%addr, "Gateway listening");
        Ok(GatewayHandle {
            addr,
            clients: self.clients,
            shutdown_tx,
            tasks: vec![accept],
        })
    }
}

/// Handle to a running gateway
pub struct GatewayHandle {
    addr: SocketAddr,
    clients: Arc<ClientSet>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl GatewayHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn clients(&self) -> Arc<ClientSet> {
        Arc::clone(&self.clients)
    }

    /// Send one binary message to every connected client
    pub async fn broadcast(&self, payload: impl Into<Bytes>) -> usize {
        self.clients.broadcast(payload.into()).await
    }

    /// Subscribe to camera, timeseries and session control topics and route
    /// them to the clients
    #[instrument(name = "gateway_attach_bus", skip(self))]
    pub async fn attach_bus(&mut self, backend_addr: SocketAddr) -> Result<(), GatewayError> {
        let subscriber = Subscriber::connect(
            backend_addr,
            [CAMERA_PREFIX, TIMESERIES_PREFIX, SESSION_PREFIX],
        )
        .await?;
        let task = tokio::spawn(route_bus(
            subscriber,
            Arc::clone(&self.clients),
            self.shutdown_tx.subscribe(),
        ));
        self.tasks.push(task);
        info!(%backend_addr, "Gateway attached to bus");
        Ok(())
    }

    /// Stop accepting, stop routing and disconnect every client
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        self.clients.close_all().await;
        info!(addr = %self.addr, "Gateway stopped");
    }
}

async fn accept_clients(
    listener: TcpListener,
    clients: Arc<ClientSet>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                tokio::spawn(serve_client(
                    stream,
                    peer,
                    Arc::clone(&clients),
                    shutdown.clone(),
                ));
            }
            Err(e) => warn!(error = %e, "Gateway accept failed"),
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    peer: SocketAddr,
    clients: Arc<ClientSet>,
    mut shutdown: watch::Receiver<bool>,
) {
    let _ = stream.set_nodelay(true);
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, error = %e, "WebSocket handshake failed");
            return;
        }
    };
    let (sink, mut incoming) = ws.split();
    let id = clients.insert(peer, sink);

    // clients only listen; incoming data is read to notice the close
    loop {
        let next = tokio::select! {
            _ = shutdown.changed() => break,
            next = incoming.next() => next,
        };
        match next {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(Message::Binary(data))) => {
                debug!(%peer, bytes = data.len(), "Ignoring binary message from client");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(%peer, error = %e, "Client connection error");
                break;
            }
        }
    }
    clients.remove(id);
}

async fn route_bus(
    mut subscriber: Subscriber,
    clients: Arc<ClientSet>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let received = tokio::select! {
            _ = shutdown.changed() => break,
            received = subscriber.recv() => received,
        };
        match received {
            Ok(Some(message)) => route_message(&clients, message).await,
            Ok(None) => {
                warn!("Bus connection closed, gateway no longer receives data");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Bus receive failed");
                break;
            }
        }
    }
    subscriber.close();
}

/// Apply a session control message or forward a data message
pub(crate) async fn route_message(clients: &ClientSet, message: BusMessage) {
    if message.topic.starts_with(SESSION_PREFIX) {
        set_active_session(clients.store(), &message.payload);
        return;
    }

    let active = SessionFilter::active_session(clients.store());
    if SessionFilter::should_forward(&message.topic, active.as_deref()) {
        let delivered = clients.broadcast(message.payload).await;
        debug!(topic = %message.topic, delivered, "Forwarded");
    }
}

fn set_active_session(store: &KvStore, payload: &[u8]) {
    match std::str::from_utf8(payload) {
        Ok(session) => {
            let session = session.trim();
            if session.is_empty() {
                store.set(KEY_ACTIVE_SESSION, Value::Null);
                info!("Active session cleared");
            } else {
                store.set(KEY_ACTIVE_SESSION, session);
                info!(session, "Active session set");
            }
        }
        Err(_) => warn!("Ignoring non UTF-8 session control message"),
    }
}
