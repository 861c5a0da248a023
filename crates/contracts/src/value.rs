//! Value - self-describing dynamic value
//!
//! Payload values for samples, command payloads, video segment info and
//! coordinator entries.

use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;

/// Payload map of a sample or static record.
///
/// `BTreeMap` keeps key order deterministic, which keeps encoding deterministic.
pub type LogDict = BTreeMap<String, Value>;

/// Dynamic value carried by records
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Bytes),
    /// 1-D fixed-width numeric sequence
    Array(NumericArray),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// 1-D numeric sequence with a declared element width
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NumericArray {
    U8(Vec<u8>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl NumericArray {
    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Width of a single element in bytes
    pub fn element_width(&self) -> usize {
        match self {
            Self::U8(_) => 1,
            Self::I32(_) | Self::F32(_) => 4,
            Self::I64(_) | Self::F64(_) => 8,
        }
    }

    /// Element type name, used in diagnostics
    pub fn element_name(&self) -> &'static str {
        match self {
            Self::U8(_) => "u8",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
        }
    }

    /// Element at `idx` widened to f64
    pub fn get_f64(&self, idx: usize) -> Option<f64> {
        match self {
            Self::U8(v) => v.get(idx).map(|x| f64::from(*x)),
            Self::I32(v) => v.get(idx).map(|x| f64::from(*x)),
            Self::I64(v) => v.get(idx).map(|x| *x as f64),
            Self::F32(v) => v.get(idx).map(|x| f64::from(*x)),
            Self::F64(v) => v.get(idx).copied(),
        }
    }
}

impl Value {
    /// Short name of the value shape, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Array(_) => "array",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Whether this is a numeric scalar (int or float)
    pub fn is_numeric_scalar(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(v) => Some(f64::from(u8::from(*v))),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&NumericArray> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Self::Bytes(v)
    }
}

impl From<NumericArray> for Value {
    fn from(v: NumericArray) -> Self {
        Self::Array(v)
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Self::Array(NumericArray::F32(v))
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Self::Array(NumericArray::F64(v))
    }
}

impl From<Vec<i32>> for Value {
    fn from(v: Vec<i32>) -> Self {
        Self::Array(NumericArray::I32(v))
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Self::Array(NumericArray::I64(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Self::Map(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_array_width() {
        assert_eq!(NumericArray::U8(vec![1, 2]).element_width(), 1);
        assert_eq!(NumericArray::F32(vec![1.0]).element_width(), 4);
        assert_eq!(NumericArray::I64(vec![]).element_width(), 8);
        assert!(NumericArray::F64(vec![]).is_empty());
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(3), Value::Int(3));
        assert_eq!(Value::from(2.5f32), Value::Float(2.5));
        assert_eq!(Value::from("a"), Value::Str("a".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(
            Value::from(vec![1.0f32, 2.0]),
            Value::Array(NumericArray::F32(vec![1.0, 2.0]))
        );
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Int(4).as_f64(), Some(4.0));
        assert_eq!(Value::Str("s".into()).as_str(), Some("s"));
        assert!(Value::Float(1.0).is_numeric_scalar());
        assert!(!Value::Bool(true).is_numeric_scalar());
        assert_eq!(Value::Map(BTreeMap::new()).kind_name(), "map");
    }

    #[test]
    fn test_value_serializes_untagged() {
        let mut map = BTreeMap::new();
        map.insert("x".to_string(), Value::Int(1));
        map.insert("v".to_string(), Value::from(vec![1.5f64]));
        let json = serde_json::to_string(&Value::Map(map)).unwrap();
        assert_eq!(json, r#"{"v":[1.5],"x":1}"#);
    }
}
