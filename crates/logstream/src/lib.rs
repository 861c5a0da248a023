//! # LogStream
//!
//! Sequential log files of record batches.
//!
//! A log file is a zstd stream carrying a concatenation of frames
//! (`u32 BE length` + encoded batch, see the `codec` crate).
//!
//! - [`LogWriter`]: lazy open, single writer lock, size monitor, rotation
//! - [`LogReader`]: streaming decompression, record-at-a-time reads,
//!   partial trailing frames treated as end of stream

mod error;
mod monitor;
mod reader;
mod writer;

pub use error::LogStreamError;
pub use reader::LogReader;
pub use writer::{
    LogWriter, LogWriterConfig, WriteOutcome, DEFAULT_COMPRESSION_LEVEL, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_MONITOR_INTERVAL,
};
