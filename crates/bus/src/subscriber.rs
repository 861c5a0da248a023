//! Subscriber - receives messages whose topic matches a registered prefix

use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::message::BusMessage;
use crate::wire::{read_message, write_message, SUBSCRIBE, SUBSCRIBED};
use crate::BusError;

/// How long `connect` waits for the broker to acknowledge every prefix
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Message callback used by [`Subscriber::listen`]
pub type MessageCallback = Arc<dyn Fn(BusMessage) + Send + Sync>;

/// Connected subscriber
///
/// Either pull messages with [`recv`](Self::recv) or hand the connection to a
/// receive loop with [`listen`](Self::listen).
pub struct Subscriber {
    addr: SocketAddr,
    prefixes: Vec<String>,
    reader: Option<BufReader<OwnedReadHalf>>,
    /// Held so the broker sees the connection open; dropped on close
    writer: Option<OwnedWriteHalf>,
    /// Messages that arrived while waiting for acknowledgements
    pending: VecDeque<BusMessage>,
    listening: Arc<AtomicBool>,
    listener: Option<JoinHandle<()>>,
    closed: bool,
}

impl Subscriber {
    /// Connect and register `prefixes`; returns once the broker acknowledged
    /// every prefix, or fails after [`DEFAULT_ACK_TIMEOUT`]
    pub async fn connect<I, S>(addr: SocketAddr, prefixes: I) -> Result<Self, BusError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::connect_with_timeout(addr, prefixes, DEFAULT_ACK_TIMEOUT).await
    }

    #[instrument(name = "subscriber_connect", skip(prefixes))]
    pub async fn connect_with_timeout<I, S>(
        addr: SocketAddr,
        prefixes: I,
        ack_timeout: Duration,
    ) -> Result<Self, BusError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes: Vec<String> = prefixes.into_iter().map(Into::into).collect();
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| BusError::Connect { addr, source })?;
        let _ = stream.set_nodelay(true);
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        for prefix in &prefixes {
            write_message(&mut write_half, &[SUBSCRIBE, prefix.as_bytes()]).await?;
        }

        let mut pending = VecDeque::new();
        let acked = tokio::time::timeout(
            ack_timeout,
            await_acks(&mut reader, &prefixes, &mut pending),
        )
        .await;
        match acked {
            Ok(result) => result?,
            Err(_) => {
                warn!(%addr, "Subscription not acknowledged in time");
                return Err(BusError::Timeout {
                    operation: "subscription ack".to_string(),
                    timeout_ms: ack_timeout.as_millis() as u64,
                });
            }
        }

        debug!(%addr, prefixes = ?prefixes, "Subscriber connected");
        Ok(Self {
            addr,
            prefixes,
            reader: Some(reader),
            writer: Some(write_half),
            pending,
            listening: Arc::new(AtomicBool::new(false)),
            listener: None,
            closed: false,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Next message; `Ok(None)` when the broker closed the connection
    ///
    /// Not available once the connection was handed to `listen` or closed.
    pub async fn recv(&mut self) -> Result<Option<BusMessage>, BusError> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(Some(message));
        }
        let reader = self.reader.as_mut().ok_or(BusError::Closed)?;
        match read_message(reader).await? {
            Some(frames) => BusMessage::from_frames(frames).map(Some),
            None => Ok(None),
        }
    }

    /// Run a receive loop invoking `callback` per message
    ///
    /// Idempotent: while a loop is already running the call does nothing.
    pub fn listen(&mut self, callback: MessageCallback) -> Result<(), BusError> {
        if self.closed {
            return Err(BusError::Closed);
        }
        if self.listening.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let Some(mut reader) = self.reader.take() else {
            self.listening.store(false, Ordering::Release);
            return Err(BusError::Closed);
        };

        let pending: Vec<BusMessage> = self.pending.drain(..).collect();
        let listening = Arc::clone(&self.listening);
        let addr = self.addr;

        self.listener = Some(tokio::spawn(async move {
            for message in pending {
                callback(message);
            }
            loop {
                match read_message(&mut reader).await {
                    Ok(Some(frames)) => match BusMessage::from_frames(frames) {
                        Ok(message) => callback(message),
                        Err(e) => warn!(%addr, error = %e, "Skipping malformed message"),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        debug!(%addr, error = %e, "Subscriber receive loop ended");
                        break;
                    }
                }
            }
            listening.store(false, Ordering::Release);
        }));
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    /// Stop the receive loop and drop the connection; idempotent
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.reader = None;
        self.writer = None;
        self.pending.clear();
        self.listening.store(false, Ordering::Release);
        debug!(addr = %self.addr, "Subscriber closed");
    }
}

/// Read until every prefix is acknowledged; other messages are kept
async fn await_acks(
    reader: &mut BufReader<OwnedReadHalf>,
    prefixes: &[String],
    pending: &mut VecDeque<BusMessage>,
) -> Result<(), BusError> {
    let mut waiting: HashSet<&[u8]> = prefixes.iter().map(|p| p.as_bytes()).collect();
    while !waiting.is_empty() {
        let frames = read_message(reader).await?.ok_or(BusError::Closed)?;
        if frames.len() == 2 && frames[0] == SUBSCRIBED {
            waiting.remove(&frames[1][..]);
        } else {
            pending.push_back(BusMessage::from_frames(frames)?);
        }
    }
    Ok(())
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// Convenience constructor for byte payload callbacks in tests and tools
pub fn payload_callback<F>(f: F) -> MessageCallback
where
    F: Fn(&str, Bytes) + Send + Sync + 'static,
{
    Arc::new(move |message: BusMessage| f(&message.topic, message.payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Broker, Publisher};
    use contracts::BusConfig;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout, Instant};

    fn local_bus() -> BusConfig {
        BusConfig {
            frontend_addr: "127.0.0.1:0".parse().unwrap(),
            backend_addr: "127.0.0.1:0".parse().unwrap(),
            subscriber_queue: 64,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_subscriber_only() {
        let broker = Broker::bind(&local_bus()).await.unwrap().spawn().unwrap();
        assert!(broker.is_ready());

        let mut camera = Subscriber::connect(broker.backend_addr(), ["/camera/"])
            .await
            .unwrap();
        let mut series = Subscriber::connect(broker.backend_addr(), ["/timeseries/"])
            .await
            .unwrap();

        let publisher = Publisher::connect(broker.frontend_addr()).await.unwrap();
        assert!(publisher.send("/camera/front", b"jpeg"));
        assert!(publisher.send("/timeseries/S1", b"batch"));

        let got = timeout(Duration::from_secs(2), camera.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(got, BusMessage::new("/camera/front", &b"jpeg"[..]));

        let got = timeout(Duration::from_secs(2), series.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(got.topic, "/timeseries/S1");

        // camera never sees the timeseries message
        assert!(timeout(Duration::from_millis(100), camera.recv()).await.is_err());

        broker.shutdown().await;
    }

    #[tokio::test]
    async fn test_listen_is_idempotent_and_close_stops_loop() {
        let broker = Broker::bind(&local_bus()).await.unwrap().spawn().unwrap();
        let mut sub = Subscriber::connect(broker.backend_addr(), [""]).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let callback = payload_callback(move |topic, payload| {
            let _ = tx.send((topic.to_string(), payload));
        });
        sub.listen(callback.clone()).unwrap();
        sub.listen(callback).unwrap();
        assert!(sub.is_listening());

        let publisher = Publisher::connect(broker.frontend_addr()).await.unwrap();
        for i in 0..5u8 {
            assert!(publisher.send("/t", &[i]));
        }
        for i in 0..5u8 {
            let (topic, payload) = timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(topic, "/t");
            assert_eq!(&payload[..], &[i]);
        }
        // single loop, no duplicates
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());

        sub.close();
        sub.close();
        assert!(!sub.is_listening());
        assert!(matches!(sub.recv().await, Err(BusError::Closed)));

        broker.shutdown().await;
    }

    #[tokio::test]
    async fn test_close_releases_broker_slot() {
        let broker = Broker::bind(&local_bus()).await.unwrap().spawn().unwrap();
        let mut sub = Subscriber::connect(broker.backend_addr(), ["/camera/"])
            .await
            .unwrap();
        assert_eq!(broker.subscriber_count(), 1);

        sub.close();
        let deadline = Instant::now() + Duration::from_secs(2);
        while broker.subscriber_count() != 0 {
            assert!(Instant::now() < deadline, "broker still routes to closed subscriber");
            sleep(Duration::from_millis(5)).await;
        }

        broker.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_ack_times_out() {
        // reads subscriptions but never acknowledges them
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut sink = Vec::new();
            let _ = tokio::io::AsyncReadExt::read_to_end(&mut socket, &mut sink).await;
        });

        let result =
            Subscriber::connect_with_timeout(addr, ["/camera/"], Duration::from_millis(100)).await;
        assert!(matches!(result, Err(BusError::Timeout { .. })));
        silent.abort();
    }
}
