//! Batch encoding

use bytes::{Buf, BufMut, Bytes, BytesMut};

use contracts::Record;

use crate::value::{
    get_bytes, get_f64, get_len, get_map, get_string, get_u8, get_value, put_bytes, put_len,
    put_map, put_str, put_value,
};
use crate::CodecError;

const TAG_SAMPLE: u8 = 1;
const TAG_IMAGE: u8 = 2;
const TAG_VIDEO_SEGMENT: u8 = 3;
const TAG_COMMAND: u8 = 4;
const TAG_STATIC: u8 = 5;

/// Encode a batch of records
pub fn encode(batch: &[Record]) -> Result<Bytes, CodecError> {
    let mut out = BytesMut::with_capacity(64 * batch.len().max(1));
    put_batch(&mut out, batch)?;
    Ok(out.freeze())
}

/// Decode a complete batch; the whole input must be consumed
pub fn decode(mut input: &[u8]) -> Result<Vec<Record>, CodecError> {
    let batch = get_batch(&mut input)?;
    if input.has_remaining() {
        return Err(CodecError::TrailingBytes {
            remaining: input.remaining(),
        });
    }
    Ok(batch)
}

pub(crate) fn put_batch(out: &mut BytesMut, batch: &[Record]) -> Result<(), CodecError> {
    put_len(out, batch.len(), "batch")?;
    for record in batch {
        put_record(out, record)?;
    }
    Ok(())
}

fn put_record(out: &mut BytesMut, record: &Record) -> Result<(), CodecError> {
    match record {
        Record::Sample { time, payload } => {
            out.put_u8(TAG_SAMPLE);
            out.put_f64(*time);
            put_map(out, payload)?;
        }
        Record::Image { name, time, data } => {
            out.put_u8(TAG_IMAGE);
            put_str(out, name, "image name")?;
            out.put_f64(*time);
            put_bytes(out, data, "image data")?;
        }
        Record::VideoSegment {
            name,
            segment,
            init_file,
            base_url,
        } => {
            out.put_u8(TAG_VIDEO_SEGMENT);
            put_str(out, name, "video name")?;
            put_value(out, segment)?;
            put_str(out, init_file, "init file")?;
            put_str(out, base_url, "base url")?;
        }
        Record::Command { name, payload } => {
            out.put_u8(TAG_COMMAND);
            put_str(out, name, "command name")?;
            put_value(out, payload)?;
        }
        Record::Static { payload } => {
            out.put_u8(TAG_STATIC);
            put_map(out, payload)?;
        }
    }
    Ok(())
}

fn get_batch(buf: &mut &[u8]) -> Result<Vec<Record>, CodecError> {
    let count = get_len(buf, "batch")?;
    let mut batch = Vec::with_capacity(count.min(buf.len()));
    for _ in 0..count {
        batch.push(get_record(buf)?);
    }
    Ok(batch)
}

fn get_record(buf: &mut &[u8]) -> Result<Record, CodecError> {
    let tag = get_u8(buf, "record tag")?;
    let record = match tag {
        TAG_SAMPLE => Record::Sample {
            time: get_f64(buf, "sample time")?,
            payload: get_map(buf, 0)?,
        },
        TAG_IMAGE => Record::Image {
            name: get_string(buf, "image name")?,
            time: get_f64(buf, "image time")?,
            data: get_bytes(buf, "image data")?,
        },
        TAG_VIDEO_SEGMENT => Record::VideoSegment {
            name: get_string(buf, "video name")?,
            segment: get_value(buf, 0)?,
            init_file: get_string(buf, "init file")?,
            base_url: get_string(buf, "base url")?,
        },
        TAG_COMMAND => Record::Command {
            name: get_string(buf, "command name")?,
            payload: get_value(buf, 0)?,
        },
        TAG_STATIC => Record::Static {
            payload: get_map(buf, 0)?,
        },
        other => return Err(CodecError::unknown_tag("record", other)),
    };
    Ok(record)
}
