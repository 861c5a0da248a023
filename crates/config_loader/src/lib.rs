//! # Config Loader
//!
//! Turns a `telemetry.toml` (or `.json`) file into a validated
//! [`TelemetryBlueprint`]: parse, apply `TELEMETRY_*` overrides, validate.
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("telemetry.toml"))?;
//! println!("Session: {}", blueprint.logger.session);
//! # Ok::<(), contracts::ContractError>(())
//! ```

mod overrides;
mod parser;
mod validator;

pub use contracts::TelemetryBlueprint;
pub use overrides::{
    apply_env_overrides, ENV_BUS_BACKEND, ENV_BUS_FRONTEND, ENV_COORDINATOR,
    ENV_FLUSH_INTERVAL_MS, ENV_GATEWAY, ENV_SESSION,
};
pub use parser::ConfigFormat;
pub use validator::validate;

use contracts::ContractError;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a blueprint file, with overrides from the process environment
    pub fn load_from_path(path: &Path) -> Result<TelemetryBlueprint, ContractError> {
        Self::load_with_overrides(path, std::env::vars())
    }

    /// Load a blueprint file, with overrides from `vars` instead of the environment
    ///
    /// # Errors
    /// Unreadable file, unknown extension, parse failure, bad override value,
    /// or a blueprint that fails [`validate`].
    pub fn load_with_overrides<I, K, V>(
        path: &Path,
        vars: I,
    ) -> Result<TelemetryBlueprint, ContractError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        let mut blueprint = format.parse(&content)?;
        apply_env_overrides(&mut blueprint, vars)?;
        validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Parse and validate in-memory content; no overrides applied
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<TelemetryBlueprint, ContractError> {
        let blueprint = format.parse(content)?;
        validate(&blueprint)?;
        Ok(blueprint)
    }

    pub fn to_toml(blueprint: &TelemetryBlueprint) -> Result<String, ContractError> {
        ConfigFormat::Toml.render(blueprint)
    }

    pub fn to_json(blueprint: &TelemetryBlueprint) -> Result<String, ContractError> {
        ConfigFormat::Json.render(blueprint)
    }
}
