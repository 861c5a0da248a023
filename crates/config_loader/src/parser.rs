//! Blueprint (de)serialization, TOML first, JSON accepted

use std::path::Path;

use contracts::{ContractError, TelemetryBlueprint};

/// On-disk blueprint format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Format implied by the file extension of `path`
    pub fn from_path(path: &Path) -> Result<Self, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse(format!(
                "{}: no extension, expected .toml or .json",
                path.display()
            ))
        })?;
        Self::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!(
                "{}: unsupported extension .{ext}, expected .toml or .json",
                path.display()
            ))
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }

    /// Deserialize a blueprint; validation is a separate step
    pub fn parse(self, content: &str) -> Result<TelemetryBlueprint, ContractError> {
        match self {
            Self::Toml => toml::from_str(content).map_err(|e| self.parse_error(e)),
            Self::Json => serde_json::from_str(content).map_err(|e| self.parse_error(e)),
        }
    }

    pub fn render(self, blueprint: &TelemetryBlueprint) -> Result<String, ContractError> {
        let rendered = match self {
            Self::Toml => toml::to_string_pretty(blueprint).map_err(|e| e.to_string()),
            Self::Json => serde_json::to_string_pretty(blueprint).map_err(|e| e.to_string()),
        };
        rendered.map_err(|e| {
            ContractError::config_parse(format!("cannot render blueprint as {}: {e}", self.name()))
        })
    }

    fn parse_error<E>(self, e: E) -> ContractError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ContractError::ConfigParse {
            message: format!("invalid {} blueprint: {e}", self.name()),
            source: Some(Box::new(e)),
        }
    }
}
