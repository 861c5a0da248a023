//! # Coordinator
//!
//! Small request/reply key-value service shared by producers and the
//! realtime gateway (client count, active session).
//!
//! - [`KvStore`]: in-process map with an optional on-update hook
//! - [`KvServer`]: TCP request/reply front of a store
//! - [`KvClient`] / [`RemoteValue`]: fresh connection per request, bounded
//!   by a timeout

mod client;
mod error;
mod server;
mod store;

pub use client::{KvClient, RemoteValue};
pub use error::CoordinatorError;
pub use server::{KvServer, KvServerHandle};
pub use store::{KvStore, UpdateHook};

/// Number of connected realtime clients, maintained by the gateway
pub const KEY_NUM_CLIENTS: &str = "websocket_num_clients";

/// Session whose timeseries the gateway forwards
pub const KEY_ACTIVE_SESSION: &str = "active_session";

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{NumericArray, Value};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn start() -> (KvServerHandle, KvClient, KvStore) {
        let store = KvStore::new();
        let server = KvServer::bind("127.0.0.1:0".parse().unwrap(), store.clone())
            .await
            .unwrap();
        let handle = server.spawn().unwrap();
        let client = KvClient::new(handle.addr(), Duration::from_secs(2));
        (handle, client, store)
    }

    #[tokio::test]
    async fn test_round_trip_value_kinds() {
        let (handle, client, _store) = start().await;

        let mut nested = BTreeMap::new();
        nested.insert("inner".to_string(), Value::List(vec![1i64.into(), "x".into()]));
        nested.insert("flag".to_string(), Value::Bool(true));

        let cases = vec![
            ("int", Value::Int(-42)),
            ("float", Value::Float(0.1)),
            ("string", Value::Str("S1".into())),
            ("map", Value::Map(nested)),
            ("array", Value::Array(NumericArray::F64(vec![1.5, -2.0, 3.25]))),
        ];
        for (name, value) in &cases {
            client.set(name, value.clone()).await.unwrap();
        }
        for (name, value) in &cases {
            assert_eq!(&client.get(name).await.unwrap(), value, "key {name}");
        }

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_key_reads_null() {
        let (handle, client, _store) = start().await;
        assert_eq!(client.get("nothing").await.unwrap(), Value::Null);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_remote_value_and_local_store_agree() {
        let (handle, client, store) = start().await;
        let session = client.remote(KEY_ACTIVE_SESSION);

        session.set("S2").await.unwrap();
        assert_eq!(store.get(KEY_ACTIVE_SESSION), Some(Value::from("S2")));

        store.set(KEY_NUM_CLIENTS, 3i64);
        assert_eq!(
            client.remote(KEY_NUM_CLIENTS).get().await.unwrap(),
            Value::Int(3)
        );
        assert_eq!(session.name(), KEY_ACTIVE_SESSION);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // accepts but never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let holder = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = KvClient::new(addr, Duration::from_millis(100));
        let err = client.get("k").await.unwrap_err();
        assert!(err.is_timeout());
        holder.abort();
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = KvClient::new(addr, Duration::from_secs(1));
        assert!(matches!(
            client.set("k", 1i64).await,
            Err(CoordinatorError::Connect { .. })
        ));
    }
}
