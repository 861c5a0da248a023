//! Log file writer
//!
//! Each `flush` ends the current zstd frame so everything written so far can
//! be decompressed by a concurrent reader. `reset` ends the stream, optionally
//! moves the finished file aside and truncates the path for a fresh stream.
//!
//! Only the first open and a completed `reset` truncate. Any other reopen,
//! e.g. after a failed reset or flush, appends a new zstd frame so frames
//! already on disk survive.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::Record;
use tracing::{debug, info, warn};
use zstd::stream::write::Encoder;

use crate::monitor::{check_size, SizeMonitor};
use crate::LogStreamError;

/// Default size threshold (100 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Default zstd level
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 10;

/// Default size monitor period
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);

/// Writer configuration
#[derive(Debug, Clone)]
pub struct LogWriterConfig {
    pub path: PathBuf,
    /// Writes are skipped once the file on disk exceeds this many bytes
    pub max_file_size: u64,
    pub compression_level: i32,
    pub monitor_interval: Duration,
}

impl LogWriterConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_max_file_size_mb(self, mb: u64) -> Self {
        self.with_max_file_size(mb.saturating_mul(1024 * 1024))
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }
}

/// Result of a single `log` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Frame appended; uncompressed frame size in bytes
    Written(usize),
    /// File is over its size limit, batch dropped
    SkippedFull,
}

struct WriterState {
    encoder: Option<Encoder<'static, File>>,
    monitor: Option<SizeMonitor>,
    frames: u64,
    closed: bool,
    /// Next open truncates the file
    truncate_on_open: bool,
}

/// Sequential, compressed log file writer
///
/// All operations take `&self`; the writer can be shared behind an `Arc`.
/// `log`, `flush`, `reset` and `close` serialize on one lock, the size
/// monitor only touches the atomic full flag.
pub struct LogWriter {
    config: LogWriterConfig,
    state: Mutex<WriterState>,
    full: Arc<AtomicBool>,
}

impl LogWriter {
    /// Create a writer; the file is opened lazily on the first write
    pub fn new(config: LogWriterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(WriterState {
                encoder: None,
                monitor: None,
                frames: 0,
                closed: false,
                truncate_on_open: true,
            }),
            full: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Open the file now instead of on first write
    pub fn init(&self) -> Result<(), LogStreamError> {
        let mut state = self.lock();
        if state.encoder.is_none() {
            state.closed = false;
            self.open_locked(&mut state)?;
        }
        Ok(())
    }

    /// Append one batch as one frame
    pub fn log(&self, batch: &[Record]) -> Result<WriteOutcome, LogStreamError> {
        if self.full.load(Ordering::Acquire) {
            return Ok(WriteOutcome::SkippedFull);
        }

        let frame = codec::encode_frame(batch)?;

        let mut state = self.lock();
        if state.closed {
            return Err(LogStreamError::Closed {
                path: self.config.path.clone(),
            });
        }
        if state.encoder.is_none() {
            self.open_locked(&mut state)?;
        }

        let encoder = state.encoder.as_mut().ok_or_else(|| LogStreamError::Closed {
            path: self.config.path.clone(),
        })?;
        encoder.write_all(&frame)?;
        state.frames += 1;

        Ok(WriteOutcome::Written(frame.len()))
    }

    /// End the current compressed frame and push it to disk
    pub fn flush(&self) -> Result<(), LogStreamError> {
        let mut state = self.lock();
        if let Some(encoder) = state.encoder.take() {
            let mut file = encoder.finish()?;
            file.flush()?;
            state.encoder = Some(Encoder::new(file, self.config.compression_level)?);
        }
        Ok(())
    }

    /// Finish the stream, optionally move the file to `move_to`, and start a
    /// new empty stream at the original path
    pub fn reset(&self, move_to: Option<&Path>) -> Result<(), LogStreamError> {
        let mut state = self.lock();
        self.close_locked(&mut state)?;

        if let Some(target) = move_to {
            std::fs::rename(&self.config.path, target)?;
            info!(
                from = %self.config.path.display(),
                to = %target.display(),
                "Log file moved"
            );
        }

        state.closed = false;
        state.truncate_on_open = true;
        self.open_locked(&mut state)?;
        debug!(path = %self.config.path.display(), "Log writer reset");
        Ok(())
    }

    /// Finish the stream and release the file; idempotent
    pub fn close(&self) -> Result<(), LogStreamError> {
        let mut state = self.lock();
        self.close_locked(&mut state)?;
        state.closed = true;
        Ok(())
    }

    /// Whether the size monitor has marked the file full
    pub fn is_full(&self) -> bool {
        self.full.load(Ordering::Acquire)
    }

    /// Check the file size right now instead of waiting for the monitor
    pub fn poll_size(&self) -> bool {
        check_size(&self.config.path, self.config.max_file_size, &self.full);
        self.is_full()
    }

    /// Frames appended since the last (re)open
    pub fn frames_written(&self) -> u64 {
        self.lock().frames
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_locked(&self, state: &mut WriterState) -> Result<(), LogStreamError> {
        let truncate = state.truncate_on_open;
        let file = OpenOptions::new()
            .create(true)
            .write(truncate)
            .truncate(truncate)
            .append(!truncate)
            .open(&self.config.path)?;
        let encoder = Encoder::new(file, self.config.compression_level)?;
        state.truncate_on_open = false;

        self.full.store(false, Ordering::Release);
        state.encoder = Some(encoder);
        state.frames = 0;
        state.monitor = Some(SizeMonitor::spawn(
            self.config.path.clone(),
            self.config.max_file_size,
            self.config.monitor_interval,
            self.full.clone(),
        )?);

        debug!(
            path = %self.config.path.display(),
            level = self.config.compression_level,
            truncate,
            max_file_size = self.config.max_file_size,
            "Log file opened"
        );
        Ok(())
    }

    fn close_locked(&self, state: &mut WriterState) -> Result<(), LogStreamError> {
        if let Some(monitor) = state.monitor.take() {
            monitor.stop();
        }
        if let Some(encoder) = state.encoder.take() {
            let file = encoder.finish()?;
            file.sync_all()?;
            debug!(
                path = %self.config.path.display(),
                frames = state.frames,
                "Log file closed"
            );
        }
        self.full.store(false, Ordering::Release);
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.config.path.display(), error = %e, "Failed to close log file");
        }
    }
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("config", &self.config)
            .field("full", &self.is_full())
            .finish()
    }
}
