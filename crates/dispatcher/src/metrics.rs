//! Dispatcher metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters for one dispatcher and its root backend
#[derive(Debug, Default)]
pub struct BackendMetrics {
    /// Records accepted from producers
    records_enqueued: AtomicU64,
    /// Batches handed to the backend successfully
    batches_flushed: AtomicU64,
    /// Records inside those batches
    records_flushed: AtomicU64,
    /// Backend calls that returned an error
    failure_count: AtomicU64,
    /// Size of the most recent batch
    last_batch_size: AtomicUsize,
}

impl BackendMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records_enqueued(&self) -> u64 {
        self.records_enqueued.load(Ordering::Relaxed)
    }

    pub fn inc_records_enqueued(&self) {
        self.records_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed.load(Ordering::Relaxed)
    }

    pub fn records_flushed(&self) -> u64 {
        self.records_flushed.load(Ordering::Relaxed)
    }

    /// Record one successful batch
    pub fn record_batch(&self, size: usize) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.records_flushed.fetch_add(size as u64, Ordering::Relaxed);
        self.last_batch_size.store(size, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_batch_size(&self) -> usize {
        self.last_batch_size.load(Ordering::Relaxed)
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_enqueued: self.records_enqueued(),
            batches_flushed: self.batches_flushed(),
            records_flushed: self.records_flushed(),
            failure_count: self.failure_count(),
            last_batch_size: self.last_batch_size(),
        }
    }
}

/// Snapshot of dispatcher metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub records_enqueued: u64,
    pub batches_flushed: u64,
    pub records_flushed: u64,
    pub failure_count: u64,
    pub last_batch_size: usize,
}

impl MetricsSnapshot {
    /// Records accepted but not yet handed to the backend (or lost to a failure)
    pub fn records_outstanding(&self) -> u64 {
        self.records_enqueued.saturating_sub(self.records_flushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_tracks_batches() {
        let metrics = BackendMetrics::new();
        for _ in 0..5 {
            metrics.inc_records_enqueued();
        }
        metrics.record_batch(3);
        metrics.inc_failure_count();

        let snap = metrics.snapshot();
        assert_eq!(snap.records_enqueued, 5);
        assert_eq!(snap.batches_flushed, 1);
        assert_eq!(snap.records_flushed, 3);
        assert_eq!(snap.last_batch_size, 3);
        assert_eq!(snap.failure_count, 1);
        assert_eq!(snap.records_outstanding(), 2);
    }
}
