//! FileBackend - persists batches through a LogWriter

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use contracts::{ContractError, LogBackend, Record};
use logstream::{
    LogStreamError, LogWriter, LogWriterConfig, WriteOutcome, DEFAULT_COMPRESSION_LEVEL,
};
use tracing::{debug, info, instrument, warn};

use super::parse_param;
use crate::DispatcherError;

/// Configuration for FileBackend
#[derive(Debug, Clone)]
pub struct FileBackendConfig {
    pub writer: LogWriterConfig,
    /// Finish a zstd frame after every batch so readers see it immediately
    pub flush_each_batch: bool,
}

impl FileBackendConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            writer: LogWriterConfig::new(path),
            flush_each_batch: false,
        }
    }

    /// Create config from params map
    ///
    /// `path` is required; `max_file_size_mb`, `compression_level`,
    /// `monitor_interval_ms` and `flush_each_batch` are optional.
    pub fn from_params(
        backend: &str,
        params: &HashMap<String, String>,
    ) -> Result<Self, DispatcherError> {
        let path = params
            .get("path")
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| DispatcherError::missing_param(backend, "path"))?;

        let mut writer = LogWriterConfig::new(path.trim())
            .with_compression_level(parse_param(
                backend,
                params,
                "compression_level",
                DEFAULT_COMPRESSION_LEVEL,
            )?);
        if params.contains_key("max_file_size_mb") {
            writer = writer.with_max_file_size_mb(parse_param(
                backend,
                params,
                "max_file_size_mb",
                0u64,
            )?);
        }
        if params.contains_key("monitor_interval_ms") {
            let ms: u64 = parse_param(backend, params, "monitor_interval_ms", 0)?;
            writer = writer.with_monitor_interval(Duration::from_millis(ms.max(1)));
        }

        Ok(Self {
            writer,
            flush_each_batch: parse_param(backend, params, "flush_each_batch", false)?,
        })
    }
}

/// Backend writing batches to a compressed log file
///
/// The same batch goes to the optional child first; a child failure is
/// returned after the file write so the file never misses a batch.
pub struct FileBackend {
    name: String,
    writer: LogWriter,
    child: Option<Box<dyn LogBackend>>,
    flush_each_batch: bool,
}

impl FileBackend {
    pub fn new(name: impl Into<String>, config: FileBackendConfig) -> Self {
        Self {
            name: name.into(),
            writer: LogWriter::new(config.writer),
            child: None,
            flush_each_batch: config.flush_each_batch,
        }
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, DispatcherError> {
        let name = name.into();
        let config = FileBackendConfig::from_params(&name, params)?;
        Ok(Self::new(name, config))
    }

    /// Forward every batch to `child` as well
    pub fn with_child(mut self, child: Box<dyn LogBackend>) -> Self {
        self.child = Some(child);
        self
    }

    pub fn path(&self) -> &Path {
        self.writer.path()
    }

    /// Whether the size monitor has stopped further writes
    pub fn is_full(&self) -> bool {
        self.writer.is_full()
    }

    fn write_error(&self, e: LogStreamError) -> ContractError {
        match e {
            LogStreamError::Closed { .. } => ContractError::BackendClosed {
                backend: self.name.clone(),
            },
            LogStreamError::Io(e) => ContractError::Io(e),
            other => ContractError::backend_write(&self.name, other.to_string()),
        }
    }
}

impl LogBackend for FileBackend {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_backend_log",
        skip(self, batch),
        fields(backend = %self.name, records = batch.len())
    )]
    fn log(&mut self, batch: &[Record]) -> Result<(), ContractError> {
        let child_result = match self.child.as_mut() {
            Some(child) => child.log(batch),
            None => Ok(()),
        };

        match self.writer.log(batch).map_err(|e| self.write_error(e))? {
            WriteOutcome::Written(bytes) => {
                debug!(backend = %self.name, bytes, "Batch written");
            }
            WriteOutcome::SkippedFull => {
                debug!(backend = %self.name, "Log file full, batch skipped");
            }
        }
        if self.flush_each_batch {
            self.writer.flush().map_err(|e| self.write_error(e))?;
        }

        if let Err(e) = &child_result {
            warn!(backend = %self.name, error = %e, "Child backend failed");
        }
        child_result
    }

    fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(child) = self.child.as_mut() {
            child.flush()?;
        }
        self.writer.flush().map_err(|e| self.write_error(e))
    }

    #[instrument(name = "file_backend_close", skip(self), fields(backend = %self.name))]
    fn close(&mut self) -> Result<(), ContractError> {
        let child_result = match self.child.as_mut() {
            Some(child) => child.close(),
            None => Ok(()),
        };
        self.writer.close().map_err(|e| self.write_error(e))?;
        info!(
            backend = %self.name,
            path = %self.writer.path().display(),
            frames = self.writer.frames_written(),
            "FileBackend closed"
        );
        child_result
    }

    /// Restart the log file; children are left alone
    fn reset(&mut self, target: Option<&Path>) -> Result<(), ContractError> {
        self.writer.reset(target).map_err(|e| self.write_error(e))
    }
}
