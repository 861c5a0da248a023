//! FanoutBackend - the same batch to several backends

use std::path::Path;

use contracts::{ContractError, LogBackend, Record};
use tracing::warn;

/// Forwards every call to each child in order
///
/// A failing child does not stop the others; the failures are joined into
/// one error.
pub struct FanoutBackend {
    name: String,
    children: Vec<Box<dyn LogBackend>>,
}

impl FanoutBackend {
    pub fn new(name: impl Into<String>, children: Vec<Box<dyn LogBackend>>) -> Self {
        Self {
            name: name.into(),
            children,
        }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn each<F>(&mut self, operation: &str, mut op: F) -> Result<(), ContractError>
    where
        F: FnMut(&mut dyn LogBackend) -> Result<(), ContractError>,
    {
        let mut failures = Vec::new();
        for child in &mut self.children {
            if let Err(e) = op(child.as_mut()) {
                warn!(backend = %self.name, child = %child.name(), operation, error = %e, "Child backend failed");
                failures.push(format!("{}: {e}", child.name()));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ContractError::backend_write(&self.name, failures.join("; ")))
        }
    }
}

impl LogBackend for FanoutBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn log(&mut self, batch: &[Record]) -> Result<(), ContractError> {
        self.each("log", |c| c.log(batch))
    }

    fn flush(&mut self) -> Result<(), ContractError> {
        self.each("flush", |c| c.flush())
    }

    fn close(&mut self) -> Result<(), ContractError> {
        self.each("close", |c| c.close())
    }

    fn reset(&mut self, target: Option<&Path>) -> Result<(), ContractError> {
        self.each("reset", |c| c.reset(target))
    }
}
