//! TraceBackend - logs batch summaries via tracing

use std::path::Path;

use contracts::{ContractError, LogBackend, Record, RecordKind};
use tracing::{debug, info, instrument};

/// Backend that only reports what passes through it
pub struct TraceBackend {
    name: String,
    batches: u64,
    records: u64,
}

impl TraceBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            batches: 0,
            records: 0,
        }
    }

    /// Batches seen since creation or the last reset
    pub fn batches(&self) -> u64 {
        self.batches
    }

    pub fn records(&self) -> u64 {
        self.records
    }
}

/// Count records of each kind, in declaration order of [`RecordKind`]
fn kind_counts(batch: &[Record]) -> [usize; 5] {
    let mut counts = [0usize; 5];
    for record in batch {
        let slot = match record.kind() {
            RecordKind::Sample => 0,
            RecordKind::Image => 1,
            RecordKind::VideoSegment => 2,
            RecordKind::Command => 3,
            RecordKind::Static => 4,
        };
        counts[slot] += 1;
    }
    counts
}

impl LogBackend for TraceBackend {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "trace_backend_log",
        skip(self, batch),
        fields(backend = %self.name, records = batch.len())
    )]
    fn log(&mut self, batch: &[Record]) -> Result<(), ContractError> {
        let [samples, images, segments, commands, statics] = kind_counts(batch);
        let first = batch.iter().find_map(Record::time);
        let last = batch.iter().rev().find_map(Record::time);

        self.batches += 1;
        self.records += batch.len() as u64;
        info!(
            backend = %self.name,
            batch = self.batches,
            samples,
            images,
            segments,
            commands,
            statics,
            first_time = ?first,
            last_time = ?last,
            "Batch received"
        );
        Ok(())
    }

    fn close(&mut self) -> Result<(), ContractError> {
        info!(
            backend = %self.name,
            batches = self.batches,
            records = self.records,
            "TraceBackend closed"
        );
        Ok(())
    }

    fn reset(&mut self, _target: Option<&Path>) -> Result<(), ContractError> {
        debug!(backend = %self.name, "TraceBackend reset");
        self.batches = 0;
        self.records = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{LogDict, Value};

    #[test]
    fn test_counts_batches_and_records() {
        let mut backend = TraceBackend::new("trace");
        let batch = vec![
            Record::Sample {
                time: 1.0,
                payload: LogDict::new(),
            },
            Record::command("clear", Value::Null),
            Record::Sample {
                time: 2.0,
                payload: LogDict::new(),
            },
        ];
        assert_eq!(kind_counts(&batch), [2, 0, 0, 1, 0]);

        backend.log(&batch).unwrap();
        backend.log(&batch[..1]).unwrap();
        assert_eq!(backend.batches(), 2);
        assert_eq!(backend.records(), 4);

        backend.reset(None).unwrap();
        assert_eq!(backend.records(), 0);
        backend.close().unwrap();
    }
}
