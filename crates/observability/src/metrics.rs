//! Record stream statistics
//!
//! Prometheus helpers plus an in-memory aggregator for summaries of a
//! record stream (a replayed log file, a recording run).

use std::collections::BTreeMap;

use contracts::{Record, RecordKind};
use metrics::{counter, histogram};

/// Count records of a batch per kind under `source`
pub fn record_batch_metrics(source: &str, batch: &[Record]) {
    for record in batch {
        counter!(
            "telemetry_records_total",
            "source" => source.to_string(),
            "kind" => record.kind().as_str()
        )
        .increment(1);
    }
    histogram!("telemetry_stream_batch_size", "source" => source.to_string())
        .record(batch.len() as f64);
}

/// Aggregates record batches in memory
#[derive(Debug, Clone, Default)]
pub struct RecordStatsAggregator {
    pub total_batches: u64,
    pub total_records: u64,
    /// Records per kind name
    pub kind_counts: BTreeMap<&'static str, u64>,
    /// Sample keys seen, with their occurrence count
    pub key_counts: BTreeMap<String, u64>,
    pub image_bytes: u64,
    pub batch_size: RunningStats,
    first_time: Option<f64>,
    last_time: Option<f64>,
}

impl RecordStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one batch
    pub fn update(&mut self, batch: &[Record]) {
        self.total_batches += 1;
        self.batch_size.push(batch.len() as f64);
        for record in batch {
            self.push(record);
        }
    }

    /// Account for one record outside any batch
    pub fn push(&mut self, record: &Record) {
        self.total_records += 1;
        *self.kind_counts.entry(record.kind().as_str()).or_insert(0) += 1;

        if let Some(time) = record.time() {
            self.first_time = Some(self.first_time.map_or(time, |t| t.min(time)));
            self.last_time = Some(self.last_time.map_or(time, |t| t.max(time)));
        }
        match record {
            Record::Image { data, .. } => self.image_bytes += data.len() as u64,
            Record::Sample { payload, .. } => {
                for key in payload.keys() {
                    *self.key_counts.entry(key.clone()).or_insert(0) += 1;
                }
            }
            _ => {}
        }
    }

    pub fn count(&self, kind: RecordKind) -> u64 {
        self.kind_counts.get(kind.as_str()).copied().unwrap_or(0)
    }

    /// Generate summary report
    pub fn summary(&self) -> StreamSummary {
        StreamSummary {
            total_batches: self.total_batches,
            total_records: self.total_records,
            kind_counts: self.kind_counts.clone(),
            sample_keys: self.key_counts.keys().cloned().collect(),
            image_bytes: self.image_bytes,
            time_span: self.first_time.zip(self.last_time),
            batch_size: self.batch_size.summary(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Summary of a record stream
#[derive(Debug, Clone, Default)]
pub struct StreamSummary {
    pub total_batches: u64,
    pub total_records: u64,
    pub kind_counts: BTreeMap<&'static str, u64>,
    pub sample_keys: Vec<String>,
    pub image_bytes: u64,
    /// First and last record time
    pub time_span: Option<(f64, f64)>,
    pub batch_size: StatsSummary,
}

impl std::fmt::Display for StreamSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Stream Summary ===")?;
        writeln!(f, "Records: {}", self.total_records)?;
        if self.total_batches > 0 {
            writeln!(f, "Batches: {} (size {})", self.total_batches, self.batch_size)?;
        }
        for (kind, count) in &self.kind_counts {
            writeln!(f, "  {kind}: {count}")?;
        }
        match self.time_span {
            Some((first, last)) => writeln!(
                f,
                "Time span: {first:.3} .. {last:.3} ({:.3}s)",
                last - first
            )?,
            None => writeln!(f, "Time span: N/A")?,
        }
        if self.image_bytes > 0 {
            writeln!(f, "Image bytes: {}", self.image_bytes)?;
        }
        if !self.sample_keys.is_empty() {
            writeln!(f, "Sample keys: {}", self.sample_keys.join(", "))?;
        }
        Ok(())
    }
}

/// Snapshot of a [`RunningStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSummary {
    pub count: u64,
    /// `(min, max)`, `None` before the first value
    pub extent: Option<(f64, f64)>,
    pub mean: f64,
    pub std_dev: f64,
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.extent {
            None => write!(f, "N/A"),
            Some((min, max)) => write!(
                f,
                "{min:.1}..{max:.1}, mean {:.2} +/- {:.2} over {}",
                self.mean, self.std_dev, self.count
            ),
        }
    }
}

/// Streaming mean, variance and extent (Welford); mergeable across sources
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    /// Sum of squared deviations from the mean
    m2: f64,
    extent: Option<(f64, f64)>,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.extent = Some(widen(self.extent, (value, value)));
    }

    /// Fold in statistics gathered elsewhere (Chan et al. pairwise update)
    pub fn merge(&mut self, other: &RunningStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let (n_a, n_b) = (self.count as f64, other.count as f64);
        let total = n_a + n_b;
        let delta = other.mean - self.mean;
        self.mean += delta * n_b / total;
        self.m2 += other.m2 + delta * delta * n_a * n_b / total;
        self.count += other.count;
        if let Some(extent) = other.extent {
            self.extent = Some(widen(self.extent, extent));
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// 0 when empty
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance, 0 below two values
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> Option<f64> {
        self.extent.map(|(min, _)| min)
    }

    pub fn max(&self) -> Option<f64> {
        self.extent.map(|(_, max)| max)
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            count: self.count,
            extent: self.extent,
            mean: self.mean,
            std_dev: self.std_dev(),
        }
    }
}

impl Extend<f64> for RunningStats {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        iter.into_iter().for_each(|value| self.push(value));
    }
}

impl FromIterator<f64> for RunningStats {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut stats = Self::default();
        stats.extend(iter);
        stats
    }
}

fn widen(extent: Option<(f64, f64)>, (lo, hi): (f64, f64)) -> (f64, f64) {
    match extent {
        Some((min, max)) => (min.min(lo), max.max(hi)),
        None => (lo, hi),
    }
}
