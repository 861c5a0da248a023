//! Sample payload normalization
//!
//! Turns an arbitrary [`LogDict`] into one that only holds scalars, strings
//! and numeric arrays.

use contracts::{ContractError, LogDict, NumericArray, Value};
use tracing::trace;

/// Normalize a payload
///
/// - keys starting with `_` are private and skipped
/// - bool, int, float, string and numeric arrays pass through
/// - a list of numbers becomes an `f32` array; an empty list an empty one
/// - a list whose first element is itself a container is skipped
/// - anything else is a [`ContractError::ValueKind`], or is dropped when
///   `silent_error` is set
pub fn normalize(obj: &LogDict, silent_error: bool) -> Result<LogDict, ContractError> {
    let mut out = LogDict::new();

    for (key, value) in obj {
        if key.starts_with('_') {
            continue;
        }
        match normalize_value(key, value) {
            Ok(Some(value)) => {
                out.insert(key.clone(), value);
            }
            Ok(None) => {}
            Err(e) if silent_error => trace!(%key, error = %e, "Dropping unsupported value"),
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

fn normalize_value(key: &str, value: &Value) -> Result<Option<Value>, ContractError> {
    match value {
        Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) | Value::Array(_) => {
            Ok(Some(value.clone()))
        }
        Value::List(items) => list_to_array(key, items),
        other => Err(ContractError::value_kind(key, other.kind_name())),
    }
}

fn list_to_array(key: &str, items: &[Value]) -> Result<Option<Value>, ContractError> {
    let Some(first) = items.first() else {
        return Ok(Some(Value::Array(NumericArray::F32(Vec::new()))));
    };

    match first {
        Value::List(_) | Value::Map(_) | Value::Array(_) | Value::Bytes(_) | Value::Null => {
            Ok(None)
        }
        Value::Str(_) => Err(ContractError::value_kind(key, "list of string")),
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Bool(_) | Value::Int(_) | Value::Float(_) => {
                        out.push(item.as_f64().unwrap_or_default() as f32);
                    }
                    other => {
                        return Err(ContractError::value_kind(
                            key,
                            format!("mixed list containing {}", other.kind_name()),
                        ))
                    }
                }
            }
            Ok(Some(Value::Array(NumericArray::F32(out))))
        }
    }
}
