//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{BackendConfig, BackendType, TelemetryBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    bus_frontend: String,
    bus_backend: String,
    coordinator: String,
    gateway: String,
    session: String,
    root_backends: usize,
    total_backends: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(summarize(&blueprint)),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

fn summarize(blueprint: &TelemetryBlueprint) -> ConfigSummary {
    ConfigSummary {
        version: format!("{:?}", blueprint.version),
        bus_frontend: blueprint.bus.frontend_addr.to_string(),
        bus_backend: blueprint.bus.backend_addr.to_string(),
        coordinator: blueprint.coordinator.addr.to_string(),
        gateway: blueprint.gateway.bind_addr.to_string(),
        session: blueprint.logger.session.clone(),
        root_backends: blueprint.backends.len(),
        total_backends: count_backends(&blueprint.backends),
    }
}

fn count_backends(backends: &[BackendConfig]) -> usize {
    backends
        .iter()
        .map(|b| 1 + count_backends(&b.children))
        .sum()
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &TelemetryBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.backends.is_empty() {
        warnings.push("No backends configured - `record` needs --output".to_string());
    }

    let mut stack: Vec<&BackendConfig> = blueprint.backends.iter().collect();
    while let Some(backend) = stack.pop() {
        match backend.backend_type {
            BackendType::Network => {
                let session = backend.param("session").unwrap_or(&blueprint.logger.session);
                if session.is_empty() {
                    warnings.push(format!(
                        "Backend '{}' publishes with an empty session - gateway will never forward it",
                        backend.name
                    ));
                }
            }
            BackendType::Log if !backend.children.is_empty() => {
                warnings.push(format!(
                    "Backend '{}' is a log backend with {} children",
                    backend.name,
                    backend.children.len()
                ));
            }
            _ => {}
        }
        stack.extend(backend.children.iter());
    }

    if blueprint.logger.flush_interval_ms > 1000 {
        warnings.push(format!(
            "logger.flush_interval_ms = {} delays realtime delivery",
            blueprint.logger.flush_interval_ms
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!(
                "  Bus: {} -> {}",
                summary.bus_frontend, summary.bus_backend
            );
            println!("  Coordinator: {}", summary.coordinator);
            println!("  Gateway: {}", summary.gateway);
            println!("  Session: {}", summary.session);
            println!(
                "  Backends: {} ({} root)",
                summary.total_backends, summary.root_backends
            );
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    const CONFIG: &str = r#"
[logger]
session = ""

[[backends]]
name = "disk"
backend_type = "file"
params = { path = "run.mdl" }

[[backends.children]]
name = "live"
backend_type = "network"
"#;

    fn args(config: PathBuf) -> ValidateArgs {
        ValidateArgs {
            config,
            json: true,
        }
    }

    #[test]
    fn test_valid_config_summary_and_warnings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("telemetry.toml");
        std::fs::write(&path, CONFIG).unwrap();

        let result = validate_config(&args(path.clone()));
        assert!(result.valid, "{:?}", result.error);
        let summary = result.summary.unwrap();
        assert_eq!(summary.root_backends, 1);
        assert_eq!(summary.total_backends, 2);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("'live'")));

        assert!(run_validate(&args(path)).is_ok());
    }

    #[test]
    fn test_invalid_and_missing_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[[backends]]\nname = \"disk\"\nbackend_type = \"file\"\n").unwrap();

        let result = validate_config(&args(path.clone()));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("path"));
        assert!(run_validate(&args(path)).is_err());

        let missing = validate_config(&args(dir.path().join("nope.toml")));
        assert!(missing.error.unwrap().starts_with("File not found"));
    }

    #[test]
    fn test_empty_config_warns_about_backends() {
        let warnings = collect_warnings(&TelemetryBlueprint::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("No backends"));
    }
}
