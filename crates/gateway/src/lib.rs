//! # Gateway
//!
//! Realtime fan-out of bus traffic to WebSocket clients.
//!
//! - [`FanoutGateway`]: accept loop, client set kept in sync with the
//!   coordinator's `websocket_num_clients`
//! - [`SessionFilter`]: only the active session's timeseries are forwarded
//! - [`GatewayHandle::attach_bus`]: subscription to camera, timeseries and
//!   session control topics
//!
//! A slow client's send holds up the broadcast to everyone after it.

mod clients;
mod error;
mod filter;
mod server;

pub use clients::ClientSet;
pub use error::GatewayError;
pub use filter::{SessionFilter, CAMERA_PREFIX, SESSION_PREFIX, TIMESERIES_PREFIX};
pub use server::{FanoutGateway, GatewayHandle};

#[cfg(test)]
mod tests {
    use super::*;
    use bus::{Broker, Publisher};
    use contracts::{BusConfig, GatewayConfig, Value};
    use coordinator::{KvStore, KEY_ACTIVE_SESSION, KEY_NUM_CLIENTS};
    use futures_util::StreamExt;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio::time::{sleep, timeout, Instant};
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn any_port() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    async fn start(store: KvStore) -> GatewayHandle {
        let config = GatewayConfig {
            bind_addr: any_port(),
        };
        FanoutGateway::bind(&config, store)
            .await
            .unwrap()
            .spawn()
            .unwrap()
    }

    async fn connect(gateway: &GatewayHandle) -> Client {
        let url = format!("ws://{}", gateway.addr());
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        ws
    }

    async fn wait_for_clients(gateway: &GatewayHandle, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while gateway.client_count() != n {
            assert!(Instant::now() < deadline, "expected {n} clients");
            sleep(Duration::from_millis(5)).await;
        }
    }

    async fn next_binary(client: &mut Client) -> Vec<u8> {
        loop {
            let message = timeout(Duration::from_secs(2), client.next())
                .await
                .expect("no message in time")
                .expect("stream ended")
                .unwrap();
            if let Message::Binary(data) = message {
                return data.to_vec();
            }
        }
    }

    #[tokio::test]
    async fn test_client_count_tracked_in_store() {
        let store = KvStore::new();
        let gateway = start(store.clone()).await;
        assert_eq!(store.get(KEY_NUM_CLIENTS), Some(Value::Int(0)));

        let first = connect(&gateway).await;
        let _second = connect(&gateway).await;
        wait_for_clients(&gateway, 2).await;
        assert_eq!(store.get(KEY_NUM_CLIENTS), Some(Value::Int(2)));

        drop(first);
        wait_for_clients(&gateway, 1).await;
        assert_eq!(store.get(KEY_NUM_CLIENTS), Some(Value::Int(1)));

        gateway.shutdown().await;
        assert_eq!(store.get(KEY_NUM_CLIENTS), Some(Value::Int(0)));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        let gateway = start(KvStore::new()).await;
        let mut a = connect(&gateway).await;
        let mut b = connect(&gateway).await;
        wait_for_clients(&gateway, 2).await;

        assert_eq!(gateway.broadcast(&b"batch"[..]).await, 2);
        assert_eq!(next_binary(&mut a).await, b"batch");
        assert_eq!(next_binary(&mut b).await, b"batch");

        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_bus_traffic_filtered_by_session() {
        let broker = Broker::bind(&BusConfig {
            frontend_addr: any_port(),
            backend_addr: any_port(),
            subscriber_queue: 64,
        })
        .await
        .unwrap()
        .spawn()
        .unwrap();

        let store = KvStore::new();
        let mut gateway = start(store.clone()).await;
        gateway.attach_bus(broker.backend_addr()).await.unwrap();
        let mut client = connect(&gateway).await;
        wait_for_clients(&gateway, 1).await;

        let publisher = Publisher::connect(broker.frontend_addr()).await.unwrap();
        // no active session yet: dropped
        publisher.send("/timeseries/S1", b"early");
        publisher.send("/session/", b"S1");
        publisher.send("/timeseries/S2", b"other");
        publisher.send("/timeseries/S1", b"one");
        publisher.send("/camera/front", b"jpeg");
        publisher.send("/session/", b"S2");
        publisher.send("/timeseries/S1", b"stale");
        publisher.send("/timeseries/S2", b"two");

        assert_eq!(next_binary(&mut client).await, b"one");
        assert_eq!(next_binary(&mut client).await, b"jpeg");
        assert_eq!(next_binary(&mut client).await, b"two");
        assert_eq!(store.get(KEY_ACTIVE_SESSION), Some(Value::from("S2")));

        publisher.shutdown().await;
        gateway.shutdown().await;
        broker.shutdown().await;
    }
}
