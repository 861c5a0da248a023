//! `dump` command implementation.

use std::io::Write;

use anyhow::{anyhow, Context, Result};
use contracts::{Record, RecordKind, Value};
use logstream::LogReader;
use observability::{record_batch_metrics, RecordStatsAggregator};
use tracing::info;

use crate::cli::DumpArgs;

/// Execute the `dump` command
pub fn run_dump(args: &DumpArgs) -> Result<()> {
    let kind = args
        .kind
        .as_deref()
        .map(|name| {
            RecordKind::from_name(name).ok_or_else(|| anyhow!("Unknown record kind '{name}'"))
        })
        .transpose()?;

    let reader = LogReader::open(&args.path)
        .with_context(|| format!("Failed to open {}", args.path.display()))?;
    info!(path = %args.path.display(), "Reading log file");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut stats = RecordStatsAggregator::new();
    let mut printed = 0usize;

    for record in reader {
        let record = record.with_context(|| format!("Failed to read {}", args.path.display()))?;
        if kind.is_some_and(|k| record.kind() != k) {
            continue;
        }
        stats.push(&record);
        record_batch_metrics("dump", std::slice::from_ref(&record));

        if args.summary || args.limit.is_some_and(|limit| printed >= limit) {
            continue;
        }
        if args.json {
            serde_json::to_writer(&mut out, &record).context("Failed to serialize record")?;
            writeln!(out)?;
        } else {
            writeln!(out, "{}", describe(&record))?;
        }
        printed += 1;
    }

    let summary = stats.summary();
    if args.summary {
        if args.json {
            let json = serde_json::json!({
                "records": summary.total_records,
                "kinds": summary.kind_counts,
                "sample_keys": summary.sample_keys,
                "image_bytes": summary.image_bytes,
                "time_span": summary.time_span,
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&json)?)?;
        } else {
            write!(out, "{summary}")?;
        }
    }
    out.flush()?;

    info!(records = summary.total_records, printed, "Dump finished");
    Ok(())
}

/// One-line description of a record
fn describe(record: &Record) -> String {
    match record {
        Record::Sample { time, payload } => {
            let fields: Vec<String> = payload
                .iter()
                .map(|(key, value)| format!("{key}={}", short(value)))
                .collect();
            format!("sample        t={time:.3}  {}", fields.join(" "))
        }
        Record::Image { name, time, data } => {
            format!("image         t={time:.3}  name={name} bytes={}", data.len())
        }
        Record::VideoSegment {
            name,
            init_file,
            base_url,
            ..
        } => format!("video_segment name={name} init={init_file} base={base_url}"),
        Record::Command { name, payload } => {
            format!("command       name={name} payload={}", short(payload))
        }
        Record::Static { payload } => {
            let keys: Vec<&str> = payload.keys().map(String::as_str).collect();
            format!("static        keys=[{}]", keys.join(", "))
        }
    }
}

/// Compact rendering of a value; arrays show only their shape
fn short(value: &Value) -> String {
    match value {
        Value::Float(f) => format!("{f:.4}"),
        Value::Array(array) => format!("<{}; {}>", array.element_name(), array.len()),
        Value::Bytes(bytes) => format!("<bytes; {}>", bytes.len()),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.kind_name().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{LogDict, NumericArray};
    use logstream::{LogWriter, LogWriterConfig};
    use std::path::Path;
    use tempfile::tempdir;

    fn write_log(path: &Path) {
        let mut payload = LogDict::new();
        payload.insert("x".into(), Value::Float(1.0));
        payload.insert("q".into(), Value::Array(NumericArray::F32(vec![1.0, 2.0])));
        let writer = LogWriter::new(LogWriterConfig::new(path));
        writer
            .log(&[
                Record::command("clear", Value::Null),
                Record::Sample { time: 0.5, payload },
            ])
            .unwrap();
        writer.close().unwrap();
    }

    fn args(path: &Path) -> DumpArgs {
        DumpArgs {
            path: path.to_path_buf(),
            summary: false,
            json: false,
            kind: None,
            limit: None,
        }
    }

    #[test]
    fn test_dump_modes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.mdl");
        write_log(&path);

        run_dump(&args(&path)).unwrap();

        let mut summary = args(&path);
        summary.summary = true;
        summary.json = true;
        run_dump(&summary).unwrap();

        let mut filtered = args(&path);
        filtered.kind = Some("sample".into());
        filtered.limit = Some(1);
        run_dump(&filtered).unwrap();
    }

    #[test]
    fn test_unknown_kind_and_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.mdl");
        write_log(&path);

        let mut bad_kind = args(&path);
        bad_kind.kind = Some("mesh".into());
        assert!(run_dump(&bad_kind).is_err());

        assert!(run_dump(&args(&dir.path().join("missing.mdl"))).is_err());
    }

    #[test]
    fn test_describe() {
        let mut payload = LogDict::new();
        payload.insert("q".into(), Value::Array(NumericArray::F32(vec![0.0; 3])));
        let line = describe(&Record::Sample { time: 1.0, payload });
        assert!(line.starts_with("sample"));
        assert!(line.contains("q=<f32; 3>"), "{line}");

        let line = describe(&Record::command("zoomReset", Value::Null));
        assert!(line.contains("payload=null"), "{line}");
    }
}
