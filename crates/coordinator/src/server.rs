//! Request/reply server over a [`KvStore`]
//!
//! ```text
//! ["get", name]          -> [encoded value]   (encoded Null if missing)
//! ["set", name, value]   -> ["ok"]
//! anything else          -> [encoded Null]
//! ```

use std::net::SocketAddr;

use bytes::Bytes;
use contracts::Value;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use bus::wire::{read_message, write_message};

use crate::store::KvStore;
use crate::CoordinatorError;

pub(crate) const GET: &[u8] = b"get";
pub(crate) const SET: &[u8] = b"set";
pub(crate) const OK: &[u8] = b"ok";

/// Bound coordinator server
pub struct KvServer {
    listener: TcpListener,
    store: KvStore,
}

impl KvServer {
    #[instrument(name = "kv_server_bind", skip(store))]
    pub async fn bind(addr: SocketAddr, store: KvStore) -> Result<Self, CoordinatorError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| CoordinatorError::Bind { addr, source })?;
        Ok(Self { listener, store })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, CoordinatorError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    /// Start serving; requests on one connection are answered in order
    pub fn spawn(self) -> Result<KvServerHandle, CoordinatorError> {
        let addr = self.local_addr()?;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let store = self.store;
        let listener = self.listener;

        let task = tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    accepted = listener.accept() => accepted,
                };
                match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(serve_connection(
                            stream,
                            peer,
                            store.clone(),
                            shutdown_rx.clone(),
                        ));
                    }
                    Err(e) => warn!(error = %e, "Coordinator accept failed"),
                }
            }
        });

        info!(%addr, "Coordinator listening");
        Ok(KvServerHandle {
            addr,
            shutdown_tx,
            task,
        })
    }
}

/// Handle to a running coordinator server
pub struct KvServerHandle {
    addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl KvServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
        info!(addr = %self.addr, "Coordinator stopped");
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    store: KvStore,
    mut shutdown: watch::Receiver<bool>,
) {
    let _ = stream.set_nodelay(true);
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let request = tokio::select! {
            _ = shutdown.changed() => break,
            request = read_message(&mut reader) => request,
        };
        let frames = match request {
            Ok(Some(frames)) => frames,
            Ok(None) => break,
            Err(e) => {
                debug!(%peer, error = %e, "Coordinator connection ended");
                break;
            }
        };

        let reply = handle_request(&store, &frames);
        if let Err(e) = write_message(&mut write_half, &[&reply[..]]).await {
            debug!(%peer, error = %e, "Failed to send reply");
            break;
        }
    }
}

fn handle_request(store: &KvStore, frames: &[Bytes]) -> Bytes {
    let action = frames.first().map(|f| &f[..]).unwrap_or_default();
    let name = frames.get(1).map(|f| String::from_utf8_lossy(f).into_owned());

    match (action, name) {
        (GET, Some(name)) => {
            let value = store.get_or_null(&name);
            encode_or_null(&name, &value)
        }
        (SET, Some(name)) => {
            let Some(raw) = frames.get(2) else {
                warn!(%name, "set request without value");
                return null_reply();
            };
            match codec::decode_value(raw) {
                Ok(value) => {
                    debug!(%name, kind = value.kind_name(), "KV set");
                    store.set(name, value);
                    Bytes::from_static(OK)
                }
                Err(e) => {
                    warn!(%name, error = %e, "Rejecting undecodable value");
                    null_reply()
                }
            }
        }
        _ => {
            debug!(action = %String::from_utf8_lossy(action), "Unknown coordinator action");
            null_reply()
        }
    }
}

fn encode_or_null(name: &str, value: &Value) -> Bytes {
    codec::encode_value(value).unwrap_or_else(|e| {
        warn!(%name, error = %e, "Stored value cannot be encoded");
        null_reply()
    })
}

fn null_reply() -> Bytes {
    // Null is one tag byte
    Bytes::from_static(&[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(parts: &[&[u8]]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::copy_from_slice(p)).collect()
    }

    #[test]
    fn test_null_reply_matches_codec() {
        assert_eq!(null_reply(), codec::encode_value(&Value::Null).unwrap());
    }

    #[test]
    fn test_get_set_requests() {
        let store = KvStore::new();
        let missing = handle_request(&store, &frames(&[GET, b"k"]));
        assert_eq!(codec::decode_value(&missing).unwrap(), Value::Null);

        let encoded = codec::encode_value(&Value::Float(2.5)).unwrap();
        let reply = handle_request(&store, &frames(&[SET, b"k", &encoded[..]]));
        assert_eq!(&reply[..], OK);

        let got = handle_request(&store, &frames(&[GET, b"k"]));
        assert_eq!(codec::decode_value(&got).unwrap(), Value::Float(2.5));
    }

    #[test]
    fn test_unknown_action_replies_null() {
        let store = KvStore::new();
        let reply = handle_request(&store, &frames(&[&b"delete"[..], b"k"]));
        assert_eq!(codec::decode_value(&reply).unwrap(), Value::Null);
        let reply = handle_request(&store, &[]);
        assert_eq!(codec::decode_value(&reply).unwrap(), Value::Null);
    }
}
