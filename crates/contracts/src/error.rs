//! Layered error definitions
//!
//! Categorized by source: config / value / coordination / backend

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Value Errors =====
    /// Unsupported value shape in a sample payload
    #[error("unsupported value of kind '{kind}' for path '{key}'")]
    ValueKind { key: String, kind: String },

    // ===== Coordination Errors =====
    /// No reply within the deadline; the operation may still have been applied
    #[error("{operation} timed out after {waited_ms}ms")]
    Timeout { operation: String, waited_ms: u64 },

    // ===== Backend Errors =====
    /// Backend write error
    #[error("backend '{backend}' write error: {message}")]
    BackendWrite { backend: String, message: String },

    /// Backend connection error
    #[error("backend '{backend}' connection error: {message}")]
    BackendConnection { backend: String, message: String },

    /// Backend already closed
    #[error("backend '{backend}' is closed")]
    BackendClosed { backend: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create unsupported value error
    pub fn value_kind(key: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::ValueKind {
            key: key.into(),
            kind: kind.into(),
        }
    }

    /// Create timeout error
    pub fn timeout(operation: impl Into<String>, waited_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            waited_ms,
        }
    }

    /// Create backend write error
    pub fn backend_write(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendWrite {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create backend connection error
    pub fn backend_connection(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendConnection {
            backend: backend.into(),
            message: message.into(),
        }
    }
}
