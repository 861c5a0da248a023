//! Deployment overrides from `TELEMETRY_*` environment variables
//!
//! Applied after parsing and before validation, so an override that breaks
//! an invariant is reported like a bad config file.

use std::net::SocketAddr;
use std::str::FromStr;

use contracts::{ContractError, TelemetryBlueprint};

pub const ENV_SESSION: &str = "TELEMETRY_SESSION";
pub const ENV_BUS_FRONTEND: &str = "TELEMETRY_BUS_FRONTEND";
pub const ENV_BUS_BACKEND: &str = "TELEMETRY_BUS_BACKEND";
pub const ENV_COORDINATOR: &str = "TELEMETRY_COORDINATOR";
pub const ENV_GATEWAY: &str = "TELEMETRY_GATEWAY";
pub const ENV_FLUSH_INTERVAL_MS: &str = "TELEMETRY_FLUSH_INTERVAL_MS";

/// Apply every recognised variable in `vars`; others are ignored
///
/// Returns the names of the variables that were applied.
pub fn apply_env_overrides<I, K, V>(
    blueprint: &mut TelemetryBlueprint,
    vars: I,
) -> Result<Vec<String>, ContractError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut applied = Vec::new();
    for (key, value) in vars {
        let (key, value) = (key.as_ref(), value.as_ref().trim());
        match key {
            ENV_SESSION => blueprint.logger.session = value.to_string(),
            ENV_BUS_FRONTEND => blueprint.bus.frontend_addr = parse_var(key, value)?,
            ENV_BUS_BACKEND => blueprint.bus.backend_addr = parse_var(key, value)?,
            ENV_COORDINATOR => blueprint.coordinator.addr = parse_var(key, value)?,
            ENV_GATEWAY => blueprint.gateway.bind_addr = parse_var::<SocketAddr>(key, value)?,
            ENV_FLUSH_INTERVAL_MS => blueprint.logger.flush_interval_ms = parse_var(key, value)?,
            _ => continue,
        }
        applied.push(key.to_string());
    }
    Ok(applied)
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, ContractError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ContractError::config_validation(key, format!("'{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognised_variables_applied() {
        let mut bp = TelemetryBlueprint::default();
        let applied = apply_env_overrides(
            &mut bp,
            [
                (ENV_SESSION, "S2"),
                (ENV_BUS_FRONTEND, " 127.0.0.1:7100 "),
                (ENV_FLUSH_INTERVAL_MS, "25"),
                ("PATH", "/usr/bin"),
            ],
        )
        .unwrap();

        assert_eq!(applied, vec![ENV_SESSION, ENV_BUS_FRONTEND, ENV_FLUSH_INTERVAL_MS]);
        assert_eq!(bp.logger.session, "S2");
        assert_eq!(bp.bus.frontend_addr.port(), 7100);
        assert_eq!(bp.logger.flush_interval_ms, 25);
        assert_eq!(bp.bus.backend_addr.port(), 5556);
    }

    #[test]
    fn test_unparseable_value_names_the_variable() {
        let mut bp = TelemetryBlueprint::default();
        match apply_env_overrides(&mut bp, [(ENV_GATEWAY, "not-an-addr")]) {
            Err(ContractError::ConfigValidation { field, message }) => {
                assert_eq!(field, ENV_GATEWAY);
                assert!(message.contains("not-an-addr"));
            }
            other => panic!("expected ConfigValidation, got {other:?}"),
        }
    }
}
