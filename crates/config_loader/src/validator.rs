//! Configuration validation
//!
//! Rules:
//! - backend names non-empty and unique across the whole tree
//! - required params present (file: `path`)
//! - numeric/boolean/address params parse
//! - out-of-process backends have children
//! - bus frontend and backend endpoints differ
//! - flush interval and coordinator timeout > 0

use std::collections::HashSet;
use std::net::SocketAddr;
use std::str::FromStr;

use contracts::{BackendConfig, BackendType, ContractError, TelemetryBlueprint};

/// Validate a TelemetryBlueprint
///
/// Returns the first error encountered.
pub fn validate(blueprint: &TelemetryBlueprint) -> Result<(), ContractError> {
    validate_bus(blueprint)?;
    validate_timing(blueprint)?;

    let mut names = HashSet::new();
    for (idx, backend) in blueprint.backends.iter().enumerate() {
        validate_backend(backend, &format!("backends[{idx}]"), &mut names)?;
    }
    Ok(())
}

fn validate_bus(blueprint: &TelemetryBlueprint) -> Result<(), ContractError> {
    let bus = &blueprint.bus;
    // port 0 asks the OS for a fresh port each time
    if bus.frontend_addr == bus.backend_addr && bus.frontend_addr.port() != 0 {
        return Err(ContractError::config_validation(
            "bus.frontend_addr / bus.backend_addr",
            format!("both endpoints use {}", bus.frontend_addr),
        ));
    }
    if bus.subscriber_queue == 0 {
        return Err(ContractError::config_validation(
            "bus.subscriber_queue",
            "subscriber_queue must be > 0",
        ));
    }
    Ok(())
}

fn validate_timing(blueprint: &TelemetryBlueprint) -> Result<(), ContractError> {
    if blueprint.logger.flush_interval_ms == 0 {
        return Err(ContractError::config_validation(
            "logger.flush_interval_ms",
            "flush_interval_ms must be > 0",
        ));
    }
    if blueprint.coordinator.timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "coordinator.timeout_ms",
            "timeout_ms must be > 0",
        ));
    }
    Ok(())
}

fn validate_backend<'a>(
    backend: &'a BackendConfig,
    field: &str,
    names: &mut HashSet<&'a str>,
) -> Result<(), ContractError> {
    if backend.name.trim().is_empty() {
        return Err(ContractError::config_validation(
            format!("{field}.name"),
            "backend name cannot be empty",
        ));
    }
    if !names.insert(backend.name.as_str()) {
        return Err(ContractError::config_validation(
            format!("{field}[name={}]", backend.name),
            "duplicate backend name",
        ));
    }

    match backend.backend_type {
        BackendType::File => {
            if backend.param("path").is_none_or(|p| p.trim().is_empty()) {
                return Err(ContractError::config_validation(
                    format!("{field}.params.path"),
                    "file backend requires 'path'",
                ));
            }
            check_param::<u64>(backend, field, "max_file_size_mb")?;
            check_param::<i32>(backend, field, "compression_level")?;
            check_param::<u64>(backend, field, "monitor_interval_ms")?;
            check_param::<bool>(backend, field, "flush_each_batch")?;
        }
        BackendType::Network => {
            check_param::<SocketAddr>(backend, field, "addr")?;
        }
        BackendType::OutOfProcess => {
            if backend.children.is_empty() {
                return Err(ContractError::config_validation(
                    format!("{field}.children"),
                    "out_of_process backend needs at least one child",
                ));
            }
            check_param::<usize>(backend, field, "min_batch")?;
            check_param::<u64>(backend, field, "idle_flush_ms")?;
            check_param::<usize>(backend, field, "queue_capacity")?;
        }
        BackendType::Log => {}
    }

    for (idx, child) in backend.children.iter().enumerate() {
        validate_backend(child, &format!("{field}.children[{idx}]"), names)?;
    }
    Ok(())
}

/// An optional param must parse as `T` when present
fn check_param<T>(backend: &BackendConfig, field: &str, key: &str) -> Result<(), ContractError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match backend.param(key) {
        Some(raw) => raw.trim().parse::<T>().map(|_| ()).map_err(|e| {
            ContractError::config_validation(
                format!("{field}.params.{key}"),
                format!("invalid value '{raw}': {e}"),
            )
        }),
        None => Ok(()),
    }
}
