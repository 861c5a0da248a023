//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Backend creation error
    #[error("failed to create backend '{name}': {message}")]
    BackendCreation { name: String, message: String },

    /// Required parameter missing from the backend configuration
    #[error("backend '{backend}' requires parameter '{param}'")]
    MissingParam { backend: String, param: String },

    /// Parameter present but unusable
    #[error("backend '{backend}' parameter '{param}': {message}")]
    InvalidParam {
        backend: String,
        param: String,
        message: String,
    },

    /// Dispatcher or backend worker no longer running
    #[error("dispatcher is closed")]
    Closed,

    /// Normalization or backend error (from contract)
    #[error("{0}")]
    Contract(#[from] contracts::ContractError),

    #[error("log stream error: {0}")]
    LogStream(#[from] logstream::LogStreamError),

    #[error("bus error: {0}")]
    Bus(#[from] bus::BusError),

    #[error("coordinator error: {0}")]
    Coordinator(#[from] coordinator::CoordinatorError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create a backend creation error
    pub fn backend_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn missing_param(backend: impl Into<String>, param: impl Into<String>) -> Self {
        Self::MissingParam {
            backend: backend.into(),
            param: param.into(),
        }
    }

    pub fn invalid_param(
        backend: impl Into<String>,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParam {
            backend: backend.into(),
            param: param.into(),
            message: message.into(),
        }
    }
}
