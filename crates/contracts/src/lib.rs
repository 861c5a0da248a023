//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the telemetry pipeline:
//! the record data model, the backend trait, errors and the configuration
//! blueprint. Business crates depend on this crate, never the other way round.
//!
//! ## Time Model
//! - Every record carries the producer's clock as `f64` seconds
//! - Ordering is enqueue order; the pipeline never sorts by time

mod backend;
mod blueprint;
mod error;
mod loggable;
mod record;
mod value;

pub use backend::LogBackend;
pub use blueprint::*;
pub use error::*;
pub use loggable::{color_key, pos_key, Loggable, SceneObject, SceneUpdate};
pub use record::{Record, RecordKind};
pub use value::{LogDict, NumericArray, Value};
