//! # Dispatcher
//!
//! Producer-side batching and the writer backends.
//!
//! Responsibilities:
//! - Normalize producer samples into records
//! - Batch records on a fixed cadence without blocking producers
//! - Hand batches to a backend tree (file, network, out-of-process, trace)
//! - Surface backend failures without stopping the flush loop

pub mod backends;
pub mod dispatcher;
pub mod error;
pub mod factory;
pub mod metrics;
pub mod normalize;

pub use backends::{
    wait_for_client, FanoutBackend, FileBackend, FileBackendConfig, NetworkBackend,
    NetworkBackendConfig, OutOfProcessBackend, OutOfProcessConfig, TraceBackend,
    TIMESERIES_PREFIX,
};
pub use dispatcher::{
    BackendFailure, DispatcherConfig, Logger, LoggerDispatcher, DEFAULT_CLEAR_MAX_DATA,
    DEFAULT_FLUSH_INTERVAL,
};
pub use error::DispatcherError;
pub use factory::{create_backend, create_root_backend, BackendContext};
pub use metrics::{BackendMetrics, MetricsSnapshot};
pub use normalize::normalize;
