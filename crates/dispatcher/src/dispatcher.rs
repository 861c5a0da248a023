//! LoggerDispatcher - batches producer records into a backend
//!
//! ```text
//! Logger (clone per producer) ──▶ unbounded queue ──▶ flush task ──▶ backend
//!                                                       every tick: drain all,
//!                                                       forward if non-empty
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use contracts::{LogBackend, LoggerConfig, Loggable, Record, Value};
use metrics::{counter, histogram};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument};

use crate::error::DispatcherError;
use crate::metrics::{BackendMetrics, MetricsSnapshot};
use crate::normalize::normalize;

/// Default flush cadence
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Default `maxData` of the `clear` command
pub const DEFAULT_CLEAR_MAX_DATA: i64 = 300_000;

const FAILURE_QUEUE: usize = 64;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub flush_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl From<&LoggerConfig> for DispatcherConfig {
    fn from(config: &LoggerConfig) -> Self {
        Self {
            flush_interval: Duration::from_millis(config.flush_interval_ms.max(1)),
        }
    }
}

/// A backend call that failed inside the flush task
#[derive(Debug, Clone)]
pub struct BackendFailure {
    pub backend: String,
    pub operation: &'static str,
    /// Records in the failed batch (0 for flush/close)
    pub records: usize,
    pub message: String,
}

/// Producer handle; cheap to clone, never blocks
#[derive(Clone)]
pub struct Logger {
    tx: mpsc::UnboundedSender<Record>,
    metrics: Arc<BackendMetrics>,
}

impl Logger {
    fn enqueue(&self, record: Record) -> Result<(), DispatcherError> {
        self.tx.send(record).map_err(|_| DispatcherError::Closed)?;
        self.metrics.inc_records_enqueued();
        counter!("telemetry_records_enqueued_total").increment(1);
        Ok(())
    }

    /// Log a sample; unsupported values are an error
    pub fn log<L: Loggable + ?Sized>(&self, obj: &L, time: f64) -> Result<(), DispatcherError> {
        self.log_with(obj, time, false)
    }

    /// Log a sample; with `silent_error` unsupported values are dropped
    pub fn log_with<L: Loggable + ?Sized>(
        &self,
        obj: &L,
        time: f64,
        silent_error: bool,
    ) -> Result<(), DispatcherError> {
        let payload = normalize(&obj.to_log_dict(), silent_error)?;
        self.enqueue(Record::Sample { time, payload })
    }

    pub fn log_image(
        &self,
        name: impl Into<String>,
        data: impl Into<Bytes>,
        time: f64,
    ) -> Result<(), DispatcherError> {
        self.enqueue(Record::Image {
            name: name.into(),
            time,
            data: data.into(),
        })
    }

    pub fn log_video_segment(
        &self,
        name: impl Into<String>,
        segment: impl Into<Value>,
        init_file: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<(), DispatcherError> {
        self.enqueue(Record::VideoSegment {
            name: name.into(),
            segment: segment.into(),
            init_file: init_file.into(),
            base_url: base_url.into(),
        })
    }

    /// Log time-independent values
    pub fn log_static<L: Loggable + ?Sized>(
        &self,
        obj: &L,
        silent_error: bool,
    ) -> Result<(), DispatcherError> {
        let payload = normalize(&obj.to_log_dict(), silent_error)?;
        self.enqueue(Record::Static { payload })
    }

    /// Send a UI command
    pub fn command(
        &self,
        name: impl Into<String>,
        payload: impl Into<Value>,
    ) -> Result<(), DispatcherError> {
        self.enqueue(Record::command(name, payload))
    }

    /// Ask clients to drop plotted data, keeping at most `max_data` points
    pub fn clear(&self, max_data: Option<i64>) -> Result<(), DispatcherError> {
        self.command(
            "clear",
            object([("maxData", Value::Int(max_data.unwrap_or(DEFAULT_CLEAR_MAX_DATA)))]),
        )
    }

    pub fn zoom_reset(&self) -> Result<(), DispatcherError> {
        self.command("zoomReset", object([]))
    }

    pub fn add_camera(&self) -> Result<(), DispatcherError> {
        self.command("3dCamera", object([]))
    }

    pub fn camera_location(
        &self,
        camera_index: i64,
        position: [f64; 3],
        look_at: [f64; 3],
    ) -> Result<(), DispatcherError> {
        self.command(
            "3dCameraLocation",
            object([
                ("cameraIndex", Value::Int(camera_index)),
                ("position", float_list(position)),
                ("lookAt", float_list(look_at)),
            ]),
        )
    }

    pub fn layout(&self, layout_def: impl Into<Value>) -> Result<(), DispatcherError> {
        self.command("layout", layout_def)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

fn object<const N: usize>(entries: [(&str, Value); N]) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

fn float_list(values: [f64; 3]) -> Value {
    Value::List(values.into_iter().map(Value::Float).collect())
}

/// Owns the flush task of one backend
pub struct LoggerDispatcher {
    name: String,
    logger: Logger,
    metrics: Arc<BackendMetrics>,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: Option<JoinHandle<()>>,
    failure_rx: Option<mpsc::Receiver<BackendFailure>>,
}

impl LoggerDispatcher {
    /// Start the flush task for `backend`
    #[instrument(
        name = "dispatcher_spawn",
        skip(backend, config),
        fields(backend = %backend.name())
    )]
    pub fn spawn(backend: Box<dyn LogBackend>, config: DispatcherConfig) -> Self {
        let name = backend.name().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let (failure_tx, failure_rx) = mpsc::channel(FAILURE_QUEUE);
        let metrics = Arc::new(BackendMetrics::new());
        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());

        let flush = FlushTask {
            name: name.clone(),
            rx,
            stop: Arc::clone(&stop),
            wake: Arc::clone(&wake),
            metrics: Arc::clone(&metrics),
            failure_tx,
        };
        let task = tokio::spawn(flush.run(backend, config.flush_interval));

        info!(backend = %name, "Dispatcher started");
        Self {
            name,
            logger: Logger {
                tx,
                metrics: Arc::clone(&metrics),
            },
            metrics,
            stop,
            wake,
            task: Some(task),
            failure_rx: Some(failure_rx),
        }
    }

    /// Backend name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// New producer handle
    pub fn logger(&self) -> Logger {
        self.logger.clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Receiver of backend failures; can be taken once
    pub fn take_failure_rx(&mut self) -> Option<mpsc::Receiver<BackendFailure>> {
        self.failure_rx.take()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop after a final drain; the backend is flushed and closed
    #[instrument(name = "dispatcher_shutdown", skip(self), fields(backend = %self.name))]
    pub async fn shutdown(mut self) -> Result<(), DispatcherError> {
        self.stop.store(true, Ordering::Release);
        self.wake.notify_one();
        if let Some(task) = self.task.take() {
            task.await.map_err(|e| {
                error!(backend = %self.name, error = ?e, "Flush task panicked");
                DispatcherError::Closed
            })?;
        }
        let snapshot = self.metrics.snapshot();
        info!(
            backend = %self.name,
            records = snapshot.records_flushed,
            batches = snapshot.batches_flushed,
            failures = snapshot.failure_count,
            "Dispatcher shutdown complete"
        );
        Ok(())
    }
}

impl Drop for LoggerDispatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}

struct FlushTask {
    name: String,
    rx: mpsc::UnboundedReceiver<Record>,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    metrics: Arc<BackendMetrics>,
    failure_tx: mpsc::Sender<BackendFailure>,
}

impl FlushTask {
    async fn run(mut self, backend: Box<dyn LogBackend>, period: Duration) {
        let mut backend = Some(backend);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {}
            }
            // read before draining so records enqueued ahead of shutdown are kept
            let stopping = self.stop.load(Ordering::Acquire);
            let (batch, disconnected) = self.drain();

            if !batch.is_empty() {
                backend = self.forward(backend, batch).await;
            }
            if stopping || disconnected || backend.is_none() {
                break;
            }
        }

        let (batch, _) = self.drain();
        if !batch.is_empty() {
            backend = self.forward(backend, batch).await;
        }

        if let Some(backend) = backend {
            self.finish(backend).await;
        }
        debug!(backend = %self.name, "Flush task stopped");
    }

    /// Take everything queued right now
    fn drain(&mut self) -> (Vec<Record>, bool) {
        let mut batch = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(record) => batch.push(record),
                Err(mpsc::error::TryRecvError::Empty) => return (batch, false),
                Err(mpsc::error::TryRecvError::Disconnected) => return (batch, true),
            }
        }
    }

    async fn forward(
        &self,
        backend: Option<Box<dyn LogBackend>>,
        batch: Vec<Record>,
    ) -> Option<Box<dyn LogBackend>> {
        let backend = backend?;
        let size = batch.len();
        let (backend, result) = on_backend(backend, move |b| b.log(&batch)).await?;

        match result {
            Ok(()) => {
                self.metrics.record_batch(size);
                counter!("telemetry_batches_flushed_total", "backend" => self.name.clone())
                    .increment(1);
                histogram!("telemetry_batch_size", "backend" => self.name.clone())
                    .record(size as f64);
            }
            Err(e) => self.report("log", size, e.to_string()),
        }
        Some(backend)
    }

    async fn finish(&self, backend: Box<dyn LogBackend>) {
        let outcome = on_backend(backend, |b| (b.flush(), b.close())).await;
        if let Some((_, (flushed, closed))) = outcome {
            if let Err(e) = flushed {
                self.report("flush", 0, e.to_string());
            }
            if let Err(e) = closed {
                self.report("close", 0, e.to_string());
            }
        }
    }

    fn report(&self, operation: &'static str, records: usize, message: String) {
        self.metrics.inc_failure_count();
        counter!("telemetry_backend_failures_total", "backend" => self.name.clone())
            .increment(1);
        error!(backend = %self.name, operation, records, error = %message, "Backend call failed");

        let _ = self.failure_tx.try_send(BackendFailure {
            backend: self.name.clone(),
            operation,
            records,
            message,
        });
    }
}

/// Run a blocking backend call off the async workers and hand the backend back
async fn on_backend<T, F>(
    backend: Box<dyn LogBackend>,
    op: F,
) -> Option<(Box<dyn LogBackend>, T)>
where
    F: FnOnce(&mut dyn LogBackend) -> T + Send + 'static,
    T: Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || {
        let mut backend = backend;
        let out = op(backend.as_mut());
        (backend, out)
    })
    .await;

    match joined {
        Ok(pair) => Some(pair),
        Err(e) => {
            error!(error = ?e, "Backend call panicked, dropping backend");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContractError, LogDict, RecordKind, SceneObject, SceneUpdate};
    use std::path::Path;
    use std::sync::Mutex;
    use tokio::time::{sleep, timeout};

    /// Records every call for inspection
    #[derive(Clone, Default)]
    struct RecordingBackend {
        batches: Arc<Mutex<Vec<Vec<Record>>>>,
        closed: Arc<AtomicBool>,
        fail: bool,
    }

    impl LogBackend for RecordingBackend {
        fn name(&self) -> &str {
            "recording"
        }

        fn log(&mut self, batch: &[Record]) -> Result<(), ContractError> {
            if self.fail {
                return Err(ContractError::backend_write("recording", "mock failure"));
            }
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(())
        }

        fn close(&mut self) -> Result<(), ContractError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn reset(&mut self, _target: Option<&Path>) -> Result<(), ContractError> {
            Ok(())
        }
    }

    fn sample(i: i64) -> LogDict {
        let mut dict = LogDict::new();
        dict.insert("i".into(), Value::Int(i));
        dict
    }

    #[tokio::test]
    async fn test_records_arrive_in_enqueue_order() {
        let backend = RecordingBackend::default();
        let dispatcher =
            LoggerDispatcher::spawn(Box::new(backend.clone()), DispatcherConfig::default());
        let logger = dispatcher.logger();

        for i in 0..200 {
            logger.log(&sample(i), i as f64).unwrap();
            if i % 50 == 0 {
                sleep(Duration::from_millis(15)).await;
            }
        }
        dispatcher.shutdown().await.unwrap();

        let batches = backend.batches.lock().unwrap();
        assert!(batches.iter().all(|b| !b.is_empty()));
        let times: Vec<f64> = batches
            .iter()
            .flatten()
            .filter_map(Record::time)
            .collect();
        assert_eq!(times, (0..200).map(|i| i as f64).collect::<Vec<_>>());
        assert!(backend.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shutdown_drains_pending_records() {
        let backend = RecordingBackend::default();
        let config = DispatcherConfig {
            flush_interval: Duration::from_secs(3600),
        };
        let dispatcher = LoggerDispatcher::spawn(Box::new(backend.clone()), config);
        // let the first (immediate) tick pass
        sleep(Duration::from_millis(20)).await;

        let logger = dispatcher.logger();
        logger.log(&sample(1), 0.0).unwrap();
        logger.zoom_reset().unwrap();

        timeout(Duration::from_secs(5), dispatcher.shutdown())
            .await
            .unwrap()
            .unwrap();

        let batches = backend.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert!(backend.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failures_reach_channel_not_producers() {
        let backend = RecordingBackend {
            fail: true,
            ..Default::default()
        };
        let mut dispatcher =
            LoggerDispatcher::spawn(Box::new(backend), DispatcherConfig::default());
        let mut failures = dispatcher.take_failure_rx().unwrap();
        assert!(dispatcher.take_failure_rx().is_none());

        dispatcher.logger().log(&sample(1), 0.0).unwrap();

        let failure = timeout(Duration::from_secs(2), failures.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failure.backend, "recording");
        assert_eq!(failure.operation, "log");
        assert_eq!(failure.records, 1);

        // loop keeps running
        dispatcher.logger().log(&sample(2), 1.0).unwrap();
        assert!(timeout(Duration::from_secs(2), failures.recv())
            .await
            .unwrap()
            .is_some());
        assert!(dispatcher.metrics().failure_count >= 2);
        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unsupported_value_fails_at_producer() {
        let backend = RecordingBackend::default();
        let dispatcher =
            LoggerDispatcher::spawn(Box::new(backend.clone()), DispatcherConfig::default());
        let logger = dispatcher.logger();

        let mut bad = sample(1);
        bad.insert("blob".into(), Value::Bytes(Bytes::from_static(b"x")));
        assert!(matches!(
            logger.log(&bad, 0.0),
            Err(DispatcherError::Contract(ContractError::ValueKind { .. }))
        ));
        logger.log_with(&bad, 0.0, true).unwrap();
        dispatcher.shutdown().await.unwrap();

        let batches = backend.batches.lock().unwrap();
        let records: Vec<&Record> = batches.iter().flatten().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_command_helpers_and_other_kinds() {
        let backend = RecordingBackend::default();
        let dispatcher =
            LoggerDispatcher::spawn(Box::new(backend.clone()), DispatcherConfig::default());
        let logger = dispatcher.logger();

        let mut scene = SceneUpdate::new();
        scene.push(SceneObject::new("arm", [0.0, 0.0, 1.0], [0.0, 0.0, 0.0, 1.0]));
        logger.log_static(&scene, false).unwrap();
        logger.log_image("camera", Bytes::from_static(b"\xff\xd8"), 0.5).unwrap();
        logger
            .log_video_segment("front", Value::Float(1.0), "init.mp4", "http://h/")
            .unwrap();
        logger.clear(None).unwrap();
        logger.add_camera().unwrap();
        logger
            .camera_location(0, [1.0, 2.0, 3.0], [0.0, 0.0, 0.0])
            .unwrap();
        logger.layout("grid").unwrap();
        dispatcher.shutdown().await.unwrap();

        let batches = backend.batches.lock().unwrap();
        let records: Vec<&Record> = batches.iter().flatten().collect();
        let kinds: Vec<RecordKind> = records.iter().map(|r| r.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                RecordKind::Static,
                RecordKind::Image,
                RecordKind::VideoSegment,
                RecordKind::Command,
                RecordKind::Command,
                RecordKind::Command,
                RecordKind::Command,
            ]
        );

        match records[3] {
            Record::Command { name, payload } => {
                assert_eq!(name, "clear");
                assert_eq!(
                    payload,
                    &object([("maxData", Value::Int(DEFAULT_CLEAR_MAX_DATA))])
                );
            }
            other => panic!("unexpected {other:?}"),
        }
        match records[5] {
            Record::Command { name, payload } => {
                assert_eq!(name, "3dCameraLocation");
                let Value::Map(map) = payload else {
                    panic!("payload is not a map");
                };
                assert_eq!(map["cameraIndex"], Value::Int(0));
                assert_eq!(map["lookAt"], float_list([0.0, 0.0, 0.0]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_logger_after_shutdown_is_closed() {
        let dispatcher = LoggerDispatcher::spawn(
            Box::new(RecordingBackend::default()),
            DispatcherConfig::default(),
        );
        let logger = dispatcher.logger();
        dispatcher.shutdown().await.unwrap();

        assert!(logger.is_closed());
        assert!(matches!(
            logger.log(&sample(1), 0.0),
            Err(DispatcherError::Closed)
        ));
    }
}
