//! File size monitor
//!
//! Background thread that flips the writer's "full" flag once the file on
//! disk grows past the threshold. It never touches the writer lock.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

/// Handle to a running monitor thread
pub(crate) struct SizeMonitor {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl SizeMonitor {
    pub(crate) fn spawn(
        path: PathBuf,
        max_size: u64,
        interval: Duration,
        full: Arc<AtomicBool>,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("logstream-size-monitor".to_string())
            .spawn(move || {
                debug!(path = %path.display(), max_size, "Size monitor started");
                loop {
                    if check_size(&path, max_size, &full) {
                        break;
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!(path = %path.display(), "Size monitor stopped");
            })?;

        Ok(Self { stop_tx, handle })
    }

    /// Stop the thread and wait for it
    pub(crate) fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            warn!("Size monitor thread panicked");
        }
    }
}

/// Check the file once; returns true when monitoring should end
///
/// Monitoring ends when the file is full or no longer exists.
pub(crate) fn check_size(path: &Path, max_size: u64, full: &AtomicBool) -> bool {
    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return true,
    };

    if size > max_size {
        if !full.swap(true, Ordering::AcqRel) {
            info!(
                path = %path.display(),
                size,
                max_size,
                "Log file reached size limit, further writes are skipped until reset"
            );
        }
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Instant;
    use tempfile::tempdir;

    #[test]
    fn test_check_size_flips_flag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.log");
        let mut file = std::fs::File::create(&path).unwrap();
        let full = AtomicBool::new(false);

        assert!(!check_size(&path, 4, &full));
        file.write_all(b"12345").unwrap();
        file.flush().unwrap();
        assert!(check_size(&path, 4, &full));
        assert!(full.load(Ordering::Acquire));
    }

    #[test]
    fn test_missing_file_ends_monitoring() {
        let dir = tempdir().unwrap();
        let full = AtomicBool::new(false);
        assert!(check_size(&dir.path().join("nope"), 4, &full));
        assert!(!full.load(Ordering::Acquire));
    }

    #[test]
    fn test_monitor_thread_detects_growth() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.log");
        let mut file = std::fs::File::create(&path).unwrap();
        let full = Arc::new(AtomicBool::new(false));

        let monitor =
            SizeMonitor::spawn(path.clone(), 8, Duration::from_millis(5), full.clone()).unwrap();
        file.write_all(&[0u8; 16]).unwrap();
        file.flush().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !full.load(Ordering::Acquire) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(full.load(Ordering::Acquire));
        monitor.stop();
    }

    #[test]
    fn test_stop_is_prompt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.log");
        std::fs::File::create(&path).unwrap();
        let full = Arc::new(AtomicBool::new(false));

        let monitor =
            SizeMonitor::spawn(path, 1 << 20, Duration::from_secs(60), full).unwrap();
        let started = Instant::now();
        monitor.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
