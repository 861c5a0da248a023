//! LogBackend trait - dispatcher output interface
//!
//! Defines the abstract interface for write destinations.

use std::path::Path;

use crate::{ContractError, Record};

/// Write destination for record batches
///
/// All backend implementations must implement this trait. Backends compose:
/// a backend may forward the same batch to child backends.
pub trait LogBackend: Send {
    /// Backend name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one batch of records, preserving their order
    ///
    /// # Errors
    /// Returns write error (should include context)
    fn log(&mut self, batch: &[Record]) -> Result<(), ContractError>;

    /// Flush buffered data (if any)
    fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    /// Close backend
    fn close(&mut self) -> Result<(), ContractError>;

    /// Start over, optionally moving the current output to `target`
    fn reset(&mut self, target: Option<&Path>) -> Result<(), ContractError>;
}

impl<B: LogBackend + ?Sized> LogBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn log(&mut self, batch: &[Record]) -> Result<(), ContractError> {
        (**self).log(batch)
    }

    fn flush(&mut self) -> Result<(), ContractError> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<(), ContractError> {
        (**self).close()
    }

    fn reset(&mut self, target: Option<&Path>) -> Result<(), ContractError> {
        (**self).reset(target)
    }
}
