//! OutOfProcessBackend - children driven by an isolated worker thread
//!
//! ```text
//! log(batch) ──Data──▶ bounded channel ──▶ worker thread ──▶ children
//!                                          accumulate ≥ min_batch,
//!                                          or flush after idle timeout
//! ```
//!
//! The worker owns its children; the caller only ever sends control
//! messages. Failures inside the worker come back on the next `log`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use contracts::{ContractError, LogBackend, Record};
use tracing::{debug, error, info, instrument, warn};

use super::parse_param;
use crate::DispatcherError;

/// Configuration for OutOfProcessBackend
#[derive(Debug, Clone)]
pub struct OutOfProcessConfig {
    /// Records accumulated before the children are called
    pub min_batch: usize,
    /// Partial batches are flushed after this much silence
    pub idle_flush: Duration,
    /// Depth of the control channel; `log` blocks when it is full
    pub queue_capacity: usize,
}

impl Default for OutOfProcessConfig {
    fn default() -> Self {
        Self {
            min_batch: 30,
            idle_flush: Duration::from_millis(100),
            queue_capacity: 1024,
        }
    }
}

impl OutOfProcessConfig {
    /// Create config from params map
    pub fn from_params(
        backend: &str,
        params: &HashMap<String, String>,
    ) -> Result<Self, DispatcherError> {
        let defaults = Self::default();
        let idle_ms: u64 = parse_param(
            backend,
            params,
            "idle_flush_ms",
            defaults.idle_flush.as_millis() as u64,
        )?;
        Ok(Self {
            min_batch: parse_param(backend, params, "min_batch", defaults.min_batch)?.max(1),
            idle_flush: Duration::from_millis(idle_ms.max(1)),
            queue_capacity: parse_param(backend, params, "queue_capacity", defaults.queue_capacity)?
                .max(1),
        })
    }
}

enum Control {
    Attach(Box<dyn LogBackend>),
    Data(Vec<Record>),
    Flush,
    /// Close one child, or every child
    Close(Option<usize>),
    Reset {
        index: Option<usize>,
        target: Option<PathBuf>,
    },
    Shutdown,
}

/// Backend whose children run on a dedicated worker thread
pub struct OutOfProcessBackend {
    name: String,
    tx: Option<SyncSender<Control>>,
    worker: Option<JoinHandle<()>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl OutOfProcessBackend {
    /// Start the worker with an initial set of children
    #[instrument(name = "out_of_process_spawn", skip_all, fields(children = children.len()))]
    pub fn spawn(
        name: impl Into<String>,
        config: OutOfProcessConfig,
        children: Vec<Box<dyn LogBackend>>,
    ) -> Result<Self, DispatcherError> {
        let name = name.into();
        let (tx, rx) = mpsc::sync_channel(config.queue_capacity.max(1));
        let last_error = Arc::new(Mutex::new(None));

        let worker = Worker {
            name: name.clone(),
            children: children.into_iter().map(Some).collect(),
            pending: Vec::new(),
            min_batch: config.min_batch.max(1),
            last_error: Arc::clone(&last_error),
        };
        let idle = config.idle_flush;
        let worker = std::thread::Builder::new()
            .name(format!("backend-worker-{name}"))
            .spawn(move || worker.run(rx, idle))?;

        info!(backend = %name, "Out-of-process worker started");
        Ok(Self {
            name,
            tx: Some(tx),
            worker: Some(worker),
            last_error,
        })
    }

    /// Hand another child to the worker
    pub fn attach(&self, child: Box<dyn LogBackend>) -> Result<(), ContractError> {
        self.send(Control::Attach(child))
    }

    /// Close the child at `index` after flushing pending records
    pub fn close_child(&self, index: usize) -> Result<(), ContractError> {
        self.send(Control::Close(Some(index)))
    }

    /// Reset the child at `index` after flushing pending records
    pub fn reset_child(&self, index: usize, target: Option<&Path>) -> Result<(), ContractError> {
        self.send(Control::Reset {
            index: Some(index),
            target: target.map(Path::to_path_buf),
        })
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn send(&self, control: Control) -> Result<(), ContractError> {
        let closed = || ContractError::BackendClosed {
            backend: self.name.clone(),
        };
        self.tx
            .as_ref()
            .ok_or_else(closed)?
            .send(control)
            .map_err(|_| closed())
    }

    fn take_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn shutdown_worker(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Control::Shutdown);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!(backend = %self.name, "Backend worker panicked");
            }
        }
    }
}

impl LogBackend for OutOfProcessBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn log(&mut self, batch: &[Record]) -> Result<(), ContractError> {
        self.send(Control::Data(batch.to_vec()))?;
        match self.take_error() {
            Some(message) => Err(ContractError::backend_write(&self.name, message)),
            None => Ok(()),
        }
    }

    fn flush(&mut self) -> Result<(), ContractError> {
        self.send(Control::Flush)
    }

    /// Flush pending records, close every child and join the worker
    #[instrument(name = "out_of_process_close", skip(self), fields(backend = %self.name))]
    fn close(&mut self) -> Result<(), ContractError> {
        self.shutdown_worker();
        match self.take_error() {
            Some(message) => Err(ContractError::backend_write(&self.name, message)),
            None => Ok(()),
        }
    }

    fn reset(&mut self, target: Option<&Path>) -> Result<(), ContractError> {
        self.send(Control::Reset {
            index: None,
            target: target.map(Path::to_path_buf),
        })
    }
}

impl Drop for OutOfProcessBackend {
    fn drop(&mut self) {
        self.shutdown_worker();
    }
}

struct Worker {
    name: String,
    /// `None` once closed
    children: Vec<Option<Box<dyn LogBackend>>>,
    pending: Vec<Record>,
    min_batch: usize,
    last_error: Arc<Mutex<Option<String>>>,
}

impl Worker {
    fn run(mut self, rx: mpsc::Receiver<Control>, idle: Duration) {
        loop {
            match rx.recv_timeout(idle) {
                Ok(Control::Data(records)) => {
                    self.pending.extend(records);
                    if self.pending.len() >= self.min_batch {
                        self.flush_pending();
                    }
                }
                Ok(Control::Attach(child)) => {
                    debug!(backend = %self.name, child = %child.name(), "Child attached");
                    self.children.push(Some(child));
                }
                Ok(Control::Flush) => {
                    self.flush_pending();
                    self.each_child(None, "flush", |c| c.flush());
                }
                Ok(Control::Close(index)) => {
                    self.flush_pending();
                    self.close_children(index);
                }
                Ok(Control::Reset { index, target }) => {
                    self.flush_pending();
                    self.each_child(index, "reset", |c| c.reset(target.as_deref()));
                }
                Ok(Control::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if !self.pending.is_empty() {
                        self.flush_pending();
                    }
                }
            }
        }

        self.flush_pending();
        self.close_children(None);
        debug!(backend = %self.name, "Backend worker stopped");
    }

    fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        self.each_child(None, "log", |c| c.log(&batch));
    }

    fn close_children(&mut self, index: Option<usize>) {
        self.each_child(index, "close", |c| c.close());
        match index {
            Some(i) => {
                if let Some(slot) = self.children.get_mut(i) {
                    *slot = None;
                }
            }
            None => self.children.iter_mut().for_each(|slot| *slot = None),
        }
    }

    fn each_child<F>(&mut self, index: Option<usize>, operation: &str, mut op: F)
    where
        F: FnMut(&mut dyn LogBackend) -> Result<(), ContractError>,
    {
        let mut failures = Vec::new();
        for (i, slot) in self.children.iter_mut().enumerate() {
            if index.is_some_and(|wanted| wanted != i) {
                continue;
            }
            let Some(child) = slot.as_mut() else {
                continue;
            };
            if let Err(e) = op(child.as_mut()) {
                warn!(backend = %self.name, child = %child.name(), operation, error = %e, "Child backend failed");
                failures.push(format!("{}: {e}", child.name()));
            }
        }
        if let Some(i) = index.filter(|i| *i >= self.children.len()) {
            failures.push(format!("no child at index {i}"));
        }
        if !failures.is_empty() {
            *self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(failures.join("; "));
        }
    }
}
