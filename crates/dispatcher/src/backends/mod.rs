//! Backend implementations
//!
//! Contains FileBackend, NetworkBackend, OutOfProcessBackend, TraceBackend
//! and FanoutBackend.

mod fanout;
mod file;
mod network;
mod out_of_process;
mod trace;

pub use self::fanout::FanoutBackend;
pub use self::file::{FileBackend, FileBackendConfig};
pub use self::network::{wait_for_client, NetworkBackend, NetworkBackendConfig, TIMESERIES_PREFIX};
pub use self::out_of_process::{OutOfProcessBackend, OutOfProcessConfig};
pub use self::trace::TraceBackend;

use std::collections::HashMap;
use std::str::FromStr;

use crate::DispatcherError;

/// Parse an optional parameter, falling back to `default` when absent
pub(crate) fn parse_param<T>(
    backend: &str,
    params: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, DispatcherError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match params.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| DispatcherError::invalid_param(backend, key, e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        let mut params = HashMap::new();
        params.insert("n".to_string(), " 42 ".to_string());
        params.insert("bad".to_string(), "x".to_string());

        assert_eq!(parse_param("b", &params, "n", 0u64).unwrap(), 42);
        assert_eq!(parse_param("b", &params, "missing", 7u64).unwrap(), 7);
        assert!(matches!(
            parse_param("b", &params, "bad", 0u64),
            Err(DispatcherError::InvalidParam { .. })
        ));
    }
}
