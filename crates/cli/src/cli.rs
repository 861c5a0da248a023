//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Telemetry - capture, persist and stream control-loop telemetry
#[derive(Parser, Debug)]
#[command(
    name = "telemetry",
    author,
    version,
    about = "Telemetry capture and real-time distribution pipeline",
    long_about = "Captures time-indexed telemetry into compressed log files and streams it \n\
                  to realtime clients through a message bus and a WebSocket gateway."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TELEMETRY_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "TELEMETRY_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Prometheus exporter port (disabled when unset)
    #[arg(long, global = true, env = "TELEMETRY_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the broker, coordinator and realtime gateway
    Serve(ServeArgs),

    /// Produce demo telemetry through the configured backends
    Record(RecordArgs),

    /// Print the records of a log file
    Dump(DumpArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),
}

/// Arguments for the `serve` command
#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "TELEMETRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Session forwarded to realtime clients until a producer switches it
    #[arg(long, env = "TELEMETRY_SESSION")]
    pub session: Option<String>,
}

/// Arguments for the `record` command
#[derive(Parser, Debug, Clone)]
pub struct RecordArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, env = "TELEMETRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Additionally write a log file here
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Override the session of network backends
    #[arg(long, env = "TELEMETRY_SESSION")]
    pub session: Option<String>,

    /// Recording length in seconds
    #[arg(long, default_value = "10")]
    pub duration: f64,

    /// Samples per second
    #[arg(long, default_value = "100")]
    pub rate: f64,

    /// Emit a synthetic camera image every N samples (0 = never)
    #[arg(long, default_value = "0")]
    pub image_every: u64,

    /// Wait up to this many seconds for a realtime client before starting
    #[arg(long)]
    pub wait_for_client: Option<u64>,

    /// Make the session the one the gateway forwards
    #[arg(long)]
    pub activate: bool,
}

/// Arguments for the `dump` command
#[derive(Parser, Debug, Clone)]
pub struct DumpArgs {
    /// Log file to read
    pub path: PathBuf,

    /// Only print a summary
    #[arg(long)]
    pub summary: bool,

    /// Output as JSON (one record per line)
    #[arg(long)]
    pub json: bool,

    /// Only records of this kind (sample, image, video_segment, command, static)
    #[arg(long)]
    pub kind: Option<String>,

    /// Stop printing after this many records
    #[arg(long)]
    pub limit: Option<usize>,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "telemetry.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_dump() {
        let cli = Cli::parse_from(["telemetry", "-v", "dump", "run.mdl", "--kind", "sample"]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Dump(args) => {
                assert_eq!(args.path, PathBuf::from("run.mdl"));
                assert_eq!(args.kind.as_deref(), Some("sample"));
                assert!(!args.summary);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_record_defaults() {
        let cli = Cli::parse_from(["telemetry", "record", "--output", "out.mdl"]);
        match cli.command {
            Commands::Record(args) => {
                assert_eq!(args.duration, 10.0);
                assert_eq!(args.rate, 100.0);
                assert_eq!(args.image_every, 0);
                assert!(args.wait_for_client.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
