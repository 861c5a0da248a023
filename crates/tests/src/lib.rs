//! # Integration Tests
//!
//! End-to-end pipelines across crates:
//! - producer -> dispatcher -> file backend -> reader
//! - producer -> network backend -> bus -> gateway -> websocket clients
//! - configuration -> backend tree -> worker thread -> files

#[cfg(test)]
mod contract_tests {
    use contracts::{Record, RecordKind, TelemetryBlueprint, Value};

    #[test]
    fn test_record_kinds_have_stable_names() {
        for kind in [
            RecordKind::Sample,
            RecordKind::Image,
            RecordKind::VideoSegment,
            RecordKind::Command,
            RecordKind::Static,
        ] {
            assert_eq!(RecordKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(
            Record::command("clear", Value::Null).kind(),
            RecordKind::Command
        );
    }

    #[test]
    fn test_default_blueprint_survives_config_round_trip() {
        let toml = config_loader::ConfigLoader::to_toml(&TelemetryBlueprint::default()).unwrap();
        let parsed =
            config_loader::ConfigLoader::load_from_str(&toml, config_loader::ConfigFormat::Toml)
                .unwrap();
        assert_eq!(parsed.logger.session, "default");
        assert!(parsed.backends.is_empty());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::net::SocketAddr;
    use std::path::Path;
    use std::time::Duration;

    use bus::{Broker, BrokerHandle, Publisher};
    use contracts::{
        BackendConfig, BackendType, BusConfig, GatewayConfig, LogBackend, LogDict, Record,
        TelemetryBlueprint, Value,
    };
    use coordinator::{KvServer, KvServerHandle, KvStore, KEY_ACTIVE_SESSION};
    use dispatcher::{
        create_root_backend, BackendContext, DispatcherConfig, FileBackend, FileBackendConfig,
        LoggerDispatcher, NetworkBackend, NetworkBackendConfig,
    };
    use futures_util::StreamExt;
    use gateway::{FanoutGateway, GatewayHandle};
    use logstream::LogReader;
    use observability::RecordStatsAggregator;
    use tempfile::tempdir;
    use tokio::net::TcpStream;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn any_port() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn sample(step: i64) -> LogDict {
        let mut payload = LogDict::new();
        payload.insert("step".into(), Value::Int(step));
        payload.insert("x".into(), Value::Float(step as f64 * 0.5));
        payload.insert(
            "q".into(),
            Value::List(vec![Value::Float(0.1), Value::Int(2)]),
        );
        payload
    }

    fn config() -> DispatcherConfig {
        DispatcherConfig {
            flush_interval: Duration::from_millis(5),
        }
    }

    fn read_all(path: &Path) -> Vec<Record> {
        LogReader::open(path).unwrap().read_all(|_| true).unwrap()
    }

    /// Broker, coordinator and gateway sharing one store
    struct Stack {
        broker: BrokerHandle,
        kv: KvServerHandle,
        gateway: GatewayHandle,
        store: KvStore,
    }

    impl Stack {
        async fn start() -> Self {
            let broker = Broker::bind(&BusConfig {
                frontend_addr: any_port(),
                backend_addr: any_port(),
                subscriber_queue: 256,
            })
            .await
            .unwrap()
            .spawn()
            .unwrap();

            let store = KvStore::new();
            let kv = KvServer::bind(any_port(), store.clone())
                .await
                .unwrap()
                .spawn()
                .unwrap();

            let mut gateway = FanoutGateway::bind(
                &GatewayConfig {
                    bind_addr: any_port(),
                },
                store.clone(),
            )
            .await
            .unwrap()
            .spawn()
            .unwrap();
            gateway.attach_bus(broker.backend_addr()).await.unwrap();

            Self {
                broker,
                kv,
                gateway,
                store,
            }
        }

        fn blueprint(&self, session: &str) -> TelemetryBlueprint {
            let mut blueprint = TelemetryBlueprint::default();
            blueprint.bus.frontend_addr = self.broker.frontend_addr();
            blueprint.bus.backend_addr = self.broker.backend_addr();
            blueprint.coordinator.addr = self.kv.addr();
            blueprint.logger.session = session.to_string();
            blueprint
        }

        async fn connect(&self) -> Client {
            let url = format!("ws://{}", self.gateway.addr());
            let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
            ws
        }

        async fn shutdown(self) {
            self.gateway.shutdown().await;
            self.kv.shutdown().await;
            self.broker.shutdown().await;
        }
    }

    /// Collect samples from binary frames until `n` arrived
    async fn receive_samples(client: &mut Client, n: usize) -> Vec<Record> {
        let mut samples = Vec::new();
        while samples.len() < n {
            let message = timeout(Duration::from_secs(3), client.next())
                .await
                .expect("no message in time")
                .expect("stream ended")
                .unwrap();
            if let Message::Binary(data) = message {
                samples.extend(codec::decode(&data).unwrap());
            }
        }
        samples
    }

    async fn next_binary(client: &mut Client) -> Vec<u8> {
        loop {
            let message = timeout(Duration::from_secs(3), client.next())
                .await
                .expect("no message in time")
                .expect("stream ended")
                .unwrap();
            if let Message::Binary(data) = message {
                return data.to_vec();
            }
        }
    }

    async fn assert_nothing_received(client: &mut Client, wait: Duration) {
        if let Ok(message) = timeout(wait, client.next()).await {
            panic!("unexpected message {message:?}");
        }
    }

    /// 1000 samples reach the file in the order they were logged
    #[tokio::test]
    async fn test_e2e_samples_to_file_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.mdl");
        let backend = FileBackend::new("disk", FileBackendConfig::new(&path));
        let dispatcher = LoggerDispatcher::spawn(Box::new(backend), config());
        let logger = dispatcher.logger();

        logger.clear(None).unwrap();
        for step in 0..1000 {
            logger.log(&sample(step), step as f64 * 0.01).unwrap();
        }
        dispatcher.shutdown().await.unwrap();
        assert!(logger.is_closed());

        let records = read_all(&path);
        assert_eq!(records.len(), 1001);
        assert!(matches!(&records[0], Record::Command { name, .. } if name == "clear"));

        let steps: Vec<i64> = records[1..]
            .iter()
            .map(|r| match r.payload().and_then(|p| p.get("step")) {
                Some(Value::Int(step)) => *step,
                other => panic!("unexpected payload {other:?}"),
            })
            .collect();
        assert_eq!(steps, (0..1000).collect::<Vec<_>>());

        let mut stats = RecordStatsAggregator::new();
        records.iter().for_each(|r| stats.push(r));
        let summary = stats.summary();
        assert_eq!(summary.total_records, 1001);
        assert_eq!(summary.kind_counts.get("sample"), Some(&1000));
        assert_eq!(summary.time_span, Some((0.0, 999.0 * 0.01)));
    }

    /// Two websocket clients both see the active session's timeseries
    #[tokio::test]
    async fn test_e2e_realtime_session_to_two_clients() {
        let stack = Stack::start().await;
        let blueprint = stack.blueprint("S1");
        let context = BackendContext::from_blueprint(&blueprint);

        let network = NetworkBackend::connect(
            "live",
            NetworkBackendConfig {
                addr: blueprint.bus.frontend_addr,
                session: "S1".into(),
            },
            context.kv.clone(),
        )
        .await
        .unwrap();

        let mut first = stack.connect().await;
        let mut second = stack.connect().await;
        // resolves once the gateway has published its client count
        assert!(network.wait_for_client(Duration::from_secs(3)).await);
        network.activate_session().await.unwrap();
        assert_eq!(
            stack.store.get(KEY_ACTIVE_SESSION),
            Some(Value::from("S1"))
        );

        let dispatcher = LoggerDispatcher::spawn(Box::new(network), config());
        let logger = dispatcher.logger();
        for step in 0..20 {
            logger.log(&sample(step), step as f64).unwrap();
        }

        for client in [&mut first, &mut second] {
            let samples = receive_samples(client, 20).await;
            let times: Vec<f64> = samples.iter().filter_map(Record::time).collect();
            assert_eq!(times, (0..20).map(f64::from).collect::<Vec<_>>());
        }

        // another session's stream is not forwarded while S1 is active
        let other = Publisher::connect(blueprint.bus.frontend_addr).await.unwrap();
        let batch = codec::encode(&[Record::Sample {
            time: 99.0,
            payload: sample(99),
        }])
        .unwrap();
        assert!(other.send("/timeseries/S2", &batch));
        for client in [&mut first, &mut second] {
            assert_nothing_received(client, Duration::from_millis(300)).await;
        }

        // routing is still alive: the next forwarded message is the camera frame
        assert!(other.send("/camera/front", b"jpeg"));
        for client in [&mut first, &mut second] {
            assert_eq!(next_binary(client).await, b"jpeg");
        }

        other.shutdown().await;
        dispatcher.shutdown().await.unwrap();
        stack.shutdown().await;
    }

    /// A worker-owned tree built from TOML writes every child file
    #[tokio::test]
    async fn test_e2e_configured_tree_with_worker() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.mdl");
        let b = dir.path().join("b.mdl");
        let toml = format!(
            r#"
[logger]
session = "offline"

[[backends]]
name = "worker"
backend_type = "out_of_process"
params = {{ min_batch = "1", idle_flush_ms = "10" }}

[[backends.children]]
name = "a"
backend_type = "file"
params = {{ path = "{}" }}

[[backends.children]]
name = "b"
backend_type = "file"
params = {{ path = "{}" }}
"#,
            a.display(),
            b.display()
        );
        let blueprint =
            config_loader::ConfigLoader::load_from_str(&toml, config_loader::ConfigFormat::Toml)
                .unwrap();
        let context = BackendContext {
            bus_frontend: blueprint.bus.frontend_addr,
            kv: None,
            session: blueprint.logger.session.clone(),
        };

        let backend = create_root_backend(&blueprint, &context).await.unwrap();
        assert_eq!(backend.name(), "worker");
        let dispatcher = LoggerDispatcher::spawn(backend, config());
        let logger = dispatcher.logger();
        for step in 0..50 {
            logger.log(&sample(step), step as f64).unwrap();
        }
        logger.log_image("front", vec![0xFF, 0xD8, 0xFF], 50.0).unwrap();
        dispatcher.shutdown().await.unwrap();

        for path in [&a, &b] {
            let records = read_all(path);
            assert_eq!(records.len(), 51, "{}", path.display());
            assert!(matches!(records.last(), Some(Record::Image { name, .. }) if name == "front"));
        }
    }

    /// Reset moves the finished stream and restarts the original path
    #[test]
    fn test_reset_rotates_and_repeats() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.mdl");
        let moved = dir.path().join("run-0.mdl");
        let mut backend = FileBackend::new("disk", FileBackendConfig::new(&path));

        let batch: Vec<Record> = (0..3)
            .map(|i| Record::Sample {
                time: i as f64,
                payload: sample(i),
            })
            .collect();
        backend.log(&batch).unwrap();
        backend.reset(Some(&moved)).unwrap();
        backend.reset(None).unwrap();
        backend.reset(None).unwrap();
        backend.log(&batch[..2]).unwrap();
        backend.close().unwrap();

        assert_eq!(read_all(&moved).len(), 3);
        assert_eq!(read_all(&path).len(), 2);
    }
}
