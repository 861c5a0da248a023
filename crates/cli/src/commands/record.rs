//! `record` command implementation.
//!
//! Drives a demo producer (sin/cos samples, optional synthetic images and a
//! small 3-D scene) through the backends of the configuration.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytes::Bytes;
use contracts::{
    BackendConfig, BackendType, LogDict, SceneObject, SceneUpdate, TelemetryBlueprint, Value,
};
use coordinator::KEY_ACTIVE_SESSION;
use dispatcher::{
    create_root_backend, wait_for_client, BackendContext, DispatcherConfig, Logger,
    LoggerDispatcher,
};
use observability::RunningStats;
use tracing::{info, warn};

use super::{load_blueprint, shutdown_signal};
use crate::cli::RecordArgs;

/// Name of the file backend added by `--output`
const OUTPUT_BACKEND: &str = "cli-output";

/// Execute the `record` command
pub async fn run_record(args: &RecordArgs) -> Result<()> {
    let mut blueprint = load_blueprint(args.config.as_deref())?;
    apply_overrides(&mut blueprint, args);
    if blueprint.backends.is_empty() {
        anyhow::bail!("No backends configured; pass --output or a config with [[backends]]");
    }
    config_loader::validate(&blueprint).context("Invalid configuration")?;
    if !(args.rate > 0.0) || !(args.duration >= 0.0) {
        anyhow::bail!("--rate must be > 0 and --duration >= 0");
    }

    let context = BackendContext::from_blueprint(&blueprint);
    let backend = create_root_backend(&blueprint, &context)
        .await
        .context("Failed to create backends")?;

    if let Some(kv) = &context.kv {
        if let Some(secs) = args.wait_for_client {
            info!(timeout_secs = secs, "Waiting for a realtime client");
            wait_for_client(kv, Duration::from_secs(secs)).await;
        }
        if args.activate {
            match kv.set(KEY_ACTIVE_SESSION, blueprint.logger.session.as_str()).await {
                Ok(()) => info!(session = %blueprint.logger.session, "Session activated"),
                Err(e) => warn!(error = %e, "Failed to activate session"),
            }
        }
    }

    let mut dispatcher = LoggerDispatcher::spawn(backend, DispatcherConfig::from(&blueprint.logger));
    let mut failures = dispatcher.take_failure_rx();
    let logger = dispatcher.logger();

    let started = Instant::now();
    let produced = tokio::select! {
        produced = produce(&logger, args) => produced?,
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping producer...");
            0
        }
    };

    dispatcher.shutdown().await?;
    let failures_seen = drain_failures(&mut failures);

    info!(
        samples = produced,
        elapsed_secs = started.elapsed().as_secs_f64(),
        backend_failures = failures_seen,
        "Recording finished"
    );
    if let Some(output) = &args.output {
        println!("Wrote {}", output.display());
    }
    Ok(())
}

fn apply_overrides(blueprint: &mut TelemetryBlueprint, args: &RecordArgs) {
    if let Some(session) = &args.session {
        info!(session = %session, "Overriding session from CLI");
        blueprint.logger.session = session.clone();
    }
    if let Some(output) = &args.output {
        blueprint.backends.push(file_backend(output));
    }
}

fn file_backend(path: &Path) -> BackendConfig {
    BackendConfig {
        name: OUTPUT_BACKEND.to_string(),
        backend_type: BackendType::File,
        params: HashMap::from([("path".to_string(), path.display().to_string())]),
        children: Vec::new(),
    }
}

/// Produce samples at `args.rate` for `args.duration` seconds
async fn produce(logger: &Logger, args: &RecordArgs) -> Result<u64> {
    let total = (args.duration * args.rate).round() as u64;
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / args.rate));
    let mut lateness = RunningStats::default();
    let started = Instant::now();

    logger.clear(None)?;
    logger.layout(layout())?;
    logger.log_static(&scene(0.0), false)?;

    for step in 0..total {
        ticker.tick().await;
        let t = step as f64 / args.rate;
        lateness.push(started.elapsed().as_secs_f64() - t);

        logger.log(&sample(step, t), t)?;
        if args.image_every > 0 && step % args.image_every == 0 {
            logger.log_image("demo", synthetic_image(step), t)?;
            logger.log(&scene(t), t)?;
        }
    }

    info!(
        samples = total,
        mean_lateness_ms = lateness.mean() * 1000.0,
        max_lateness_ms = lateness.max().unwrap_or_default() * 1000.0,
        "Producer finished"
    );
    Ok(total)
}

fn sample(step: u64, t: f64) -> LogDict {
    let mut dict = LogDict::new();
    dict.insert("step".into(), Value::Int(step as i64));
    dict.insert("sin".into(), Value::Float(t.sin()));
    dict.insert("cos".into(), Value::Float(t.cos()));
    dict.insert(
        "q".into(),
        Value::List(vec![
            Value::Float(t.sin()),
            Value::Float(t.cos()),
            Value::Float((2.0 * t).sin()),
        ]),
    );
    dict
}

fn scene(t: f64) -> SceneUpdate {
    let mut update = SceneUpdate::new();
    update.push(
        SceneObject::new(
            "marker",
            [t.cos() as f32, t.sin() as f32, 0.5],
            [0.0, 0.0, 0.0, 1.0],
        )
        .with_color([255, 120, 0, 255]),
    );
    update
}

fn layout() -> Value {
    Value::List(vec![
        Value::List(vec!["sin".into(), "cos".into()]),
        Value::List(vec!["q".into()]),
    ])
}

/// JPEG-framed placeholder bytes that vary with `step`
fn synthetic_image(step: u64) -> Bytes {
    let mut data = vec![0xff, 0xd8];
    data.extend((0..64u64).map(|i| ((i + step) % 251) as u8));
    data.extend([0xff, 0xd9]);
    Bytes::from(data)
}

/// Drain the failure channel; returns the number of failures seen
fn drain_failures(
    failures: &mut Option<tokio::sync::mpsc::Receiver<dispatcher::BackendFailure>>,
) -> usize {
    let Some(rx) = failures.as_mut() else {
        return 0;
    };
    let mut count = 0;
    while let Ok(failure) = rx.try_recv() {
        warn!(
            backend = %failure.backend,
            operation = failure.operation,
            records = failure.records,
            error = %failure.message,
            "Backend failure during recording"
        );
        count += 1;
    }
    count
}
