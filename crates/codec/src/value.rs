//! Value encoding and the primitive readers/writers shared with records

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

use contracts::{NumericArray, Value};

use crate::CodecError;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STR: u8 = 4;
const TAG_BYTES: u8 = 5;
const TAG_ARRAY: u8 = 6;
const TAG_LIST: u8 = 7;
const TAG_MAP: u8 = 8;

const KIND_U8: u8 = 0;
const KIND_I32: u8 = 1;
const KIND_I64: u8 = 2;
const KIND_F32: u8 = 3;
const KIND_F64: u8 = 4;

/// Deepest list/map nesting accepted by the decoder
const MAX_DEPTH: usize = 64;

/// Encode a standalone value
pub fn encode_value(value: &Value) -> Result<Bytes, CodecError> {
    let mut out = BytesMut::new();
    put_value(&mut out, value)?;
    Ok(out.freeze())
}

/// Decode a standalone value; the whole input must be consumed
pub fn decode_value(mut input: &[u8]) -> Result<Value, CodecError> {
    let value = get_value(&mut input, 0)?;
    if input.has_remaining() {
        return Err(CodecError::TrailingBytes {
            remaining: input.remaining(),
        });
    }
    Ok(value)
}

// ===== writers =====

pub(crate) fn put_len(out: &mut BytesMut, len: usize, context: &'static str) -> Result<(), CodecError> {
    let len = u32::try_from(len).map_err(|_| CodecError::TooLong { context, len })?;
    out.put_u32(len);
    Ok(())
}

pub(crate) fn put_str(out: &mut BytesMut, s: &str, context: &'static str) -> Result<(), CodecError> {
    put_len(out, s.len(), context)?;
    out.put_slice(s.as_bytes());
    Ok(())
}

pub(crate) fn put_bytes(out: &mut BytesMut, b: &[u8], context: &'static str) -> Result<(), CodecError> {
    put_len(out, b.len(), context)?;
    out.put_slice(b);
    Ok(())
}

pub(crate) fn put_map(out: &mut BytesMut, map: &BTreeMap<String, Value>) -> Result<(), CodecError> {
    put_len(out, map.len(), "map")?;
    for (key, value) in map {
        put_str(out, key, "map key")?;
        put_value(out, value)?;
    }
    Ok(())
}

pub(crate) fn put_value(out: &mut BytesMut, value: &Value) -> Result<(), CodecError> {
    match value {
        Value::Null => out.put_u8(TAG_NULL),
        Value::Bool(v) => {
            out.put_u8(TAG_BOOL);
            out.put_u8(u8::from(*v));
        }
        Value::Int(v) => {
            out.put_u8(TAG_INT);
            out.put_i64(*v);
        }
        Value::Float(v) => {
            out.put_u8(TAG_FLOAT);
            out.put_f64(*v);
        }
        Value::Str(s) => {
            out.put_u8(TAG_STR);
            put_str(out, s, "string")?;
        }
        Value::Bytes(b) => {
            out.put_u8(TAG_BYTES);
            put_bytes(out, b, "bytes")?;
        }
        Value::Array(array) => {
            out.put_u8(TAG_ARRAY);
            put_array(out, array)?;
        }
        Value::List(items) => {
            out.put_u8(TAG_LIST);
            put_len(out, items.len(), "list")?;
            for item in items {
                put_value(out, item)?;
            }
        }
        Value::Map(map) => {
            out.put_u8(TAG_MAP);
            put_map(out, map)?;
        }
    }
    Ok(())
}

fn put_array(out: &mut BytesMut, array: &NumericArray) -> Result<(), CodecError> {
    out.reserve(5 + array.len() * array.element_width());
    match array {
        NumericArray::U8(v) => {
            out.put_u8(KIND_U8);
            put_bytes(out, v, "array")?;
        }
        NumericArray::I32(v) => {
            out.put_u8(KIND_I32);
            put_len(out, v.len(), "array")?;
            v.iter().for_each(|x| out.put_i32(*x));
        }
        NumericArray::I64(v) => {
            out.put_u8(KIND_I64);
            put_len(out, v.len(), "array")?;
            v.iter().for_each(|x| out.put_i64(*x));
        }
        NumericArray::F32(v) => {
            out.put_u8(KIND_F32);
            put_len(out, v.len(), "array")?;
            v.iter().for_each(|x| out.put_f32(*x));
        }
        NumericArray::F64(v) => {
            out.put_u8(KIND_F64);
            put_len(out, v.len(), "array")?;
            v.iter().for_each(|x| out.put_f64(*x));
        }
    }
    Ok(())
}

// ===== readers =====

fn ensure(buf: &[u8], n: usize, context: &'static str) -> Result<(), CodecError> {
    if buf.len() < n {
        return Err(CodecError::truncated(context, n - buf.len()));
    }
    Ok(())
}

pub(crate) fn get_u8(buf: &mut &[u8], context: &'static str) -> Result<u8, CodecError> {
    ensure(buf, 1, context)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_f64(buf: &mut &[u8], context: &'static str) -> Result<f64, CodecError> {
    ensure(buf, 8, context)?;
    Ok(buf.get_f64())
}

pub(crate) fn get_len(buf: &mut &[u8], context: &'static str) -> Result<usize, CodecError> {
    ensure(buf, 4, context)?;
    Ok(buf.get_u32() as usize)
}

pub(crate) fn get_raw<'a>(
    buf: &mut &'a [u8],
    len: usize,
    context: &'static str,
) -> Result<&'a [u8], CodecError> {
    ensure(buf, len, context)?;
    let whole: &'a [u8] = buf;
    let (head, tail) = whole.split_at(len);
    *buf = tail;
    Ok(head)
}

pub(crate) fn get_string(buf: &mut &[u8], context: &'static str) -> Result<String, CodecError> {
    let len = get_len(buf, context)?;
    let raw = get_raw(buf, len, context)?;
    String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8 { context })
}

pub(crate) fn get_bytes(buf: &mut &[u8], context: &'static str) -> Result<Bytes, CodecError> {
    let len = get_len(buf, context)?;
    Ok(Bytes::copy_from_slice(get_raw(buf, len, context)?))
}

pub(crate) fn get_map(
    buf: &mut &[u8],
    depth: usize,
) -> Result<BTreeMap<String, Value>, CodecError> {
    let count = get_len(buf, "map")?;
    let mut map = BTreeMap::new();
    for _ in 0..count {
        let key = get_string(buf, "map key")?;
        let value = get_value(buf, depth + 1)?;
        map.insert(key, value);
    }
    Ok(map)
}

pub(crate) fn get_value(buf: &mut &[u8], depth: usize) -> Result<Value, CodecError> {
    if depth > MAX_DEPTH {
        return Err(CodecError::NestingTooDeep { max: MAX_DEPTH });
    }
    let tag = get_u8(buf, "value tag")?;
    let value = match tag {
        TAG_NULL => Value::Null,
        TAG_BOOL => Value::Bool(get_u8(buf, "bool")? != 0),
        TAG_INT => {
            ensure(buf, 8, "int")?;
            Value::Int(buf.get_i64())
        }
        TAG_FLOAT => Value::Float(get_f64(buf, "float")?),
        TAG_STR => Value::Str(get_string(buf, "string")?),
        TAG_BYTES => Value::Bytes(get_bytes(buf, "bytes")?),
        TAG_ARRAY => Value::Array(get_array(buf)?),
        TAG_LIST => {
            let count = get_len(buf, "list")?;
            // Every value takes at least one byte; cap the preallocation by what is left.
            let mut items = Vec::with_capacity(count.min(buf.len()));
            for _ in 0..count {
                items.push(get_value(buf, depth + 1)?);
            }
            Value::List(items)
        }
        TAG_MAP => Value::Map(get_map(buf, depth)?),
        other => return Err(CodecError::unknown_tag("value", other)),
    };
    Ok(value)
}

fn get_array(buf: &mut &[u8]) -> Result<NumericArray, CodecError> {
    let kind = get_u8(buf, "array kind")?;
    let count = get_len(buf, "array")?;
    let width = match kind {
        KIND_U8 => 1,
        KIND_I32 | KIND_F32 => 4,
        KIND_I64 | KIND_F64 => 8,
        other => return Err(CodecError::unknown_tag("array kind", other)),
    };
    let total = count
        .checked_mul(width)
        .ok_or_else(|| CodecError::truncated("array", usize::MAX))?;
    let mut raw = get_raw(buf, total, "array")?;

    let array = match kind {
        KIND_U8 => NumericArray::U8(raw.to_vec()),
        KIND_I32 => NumericArray::I32((0..count).map(|_| raw.get_i32()).collect()),
        KIND_I64 => NumericArray::I64((0..count).map(|_| raw.get_i64()).collect()),
        KIND_F32 => NumericArray::F32((0..count).map(|_| raw.get_f32()).collect()),
        _ => NumericArray::F64((0..count).map(|_| raw.get_f64()).collect()),
    };
    Ok(array)
}
