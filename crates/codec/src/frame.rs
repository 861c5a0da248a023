//! Length-prefixed framing with incremental decoding

use bytes::{Buf, BufMut, Bytes, BytesMut};

use contracts::Record;

use crate::record::{decode, put_batch};
use crate::CodecError;

/// Size of the big-endian length prefix
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest frame body accepted by the decoder (256 MiB)
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Encode a batch as one frame: `u32 BE length` followed by the encoded batch
pub fn encode_frame(batch: &[Record]) -> Result<Bytes, CodecError> {
    let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + 64 * batch.len().max(1));
    out.put_u32(0);
    put_batch(&mut out, batch)?;

    let body_len = out.len() - FRAME_HEADER_LEN;
    let len = u32::try_from(body_len).map_err(|_| CodecError::TooLong {
        context: "frame",
        len: body_len,
    })?;
    out[..FRAME_HEADER_LEN].copy_from_slice(&len.to_be_bytes());
    Ok(out.freeze())
}

/// Try to take one frame off the front of a growing buffer
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete frame; in
/// that case nothing is consumed. Otherwise exactly one frame is consumed and
/// its batch returned.
pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<Vec<Record>>, CodecError> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }

    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    if buf.len() < FRAME_HEADER_LEN + len {
        buf.reserve(FRAME_HEADER_LEN + len - buf.len());
        return Ok(None);
    }

    buf.advance(FRAME_HEADER_LEN);
    let body = buf.split_to(len);
    decode(&body).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{LogDict, Value};

    fn sample(i: i64) -> Record {
        let mut payload = LogDict::new();
        payload.insert("x".into(), Value::Int(i));
        Record::Sample {
            time: i as f64,
            payload,
        }
    }

    #[test]
    fn test_frame_header_is_big_endian_length() {
        let frame = encode_frame(&[sample(1)]).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - FRAME_HEADER_LEN);
    }

    #[test]
    fn test_incremental_decoding_byte_by_byte() {
        let first = encode_frame(&[sample(1), sample(2)]).unwrap();
        let second = encode_frame(&[sample(3)]).unwrap();
        let stream: Vec<u8> = first.iter().chain(second.iter()).copied().collect();

        let mut buf = BytesMut::new();
        let mut batches = Vec::new();
        for byte in stream {
            buf.put_u8(byte);
            if let Some(batch) = decode_frame(&mut buf).unwrap() {
                batches.push(batch);
            }
        }

        assert_eq!(batches, vec![vec![sample(1), sample(2)], vec![sample(3)]]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_need_more_keeps_partial_data() {
        let frame = encode_frame(&[sample(7)]).unwrap();
        let mut buf = BytesMut::from(&frame[..frame.len() - 1]);
        let before = buf.len();
        assert_eq!(decode_frame(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), before);

        buf.put_u8(frame[frame.len() - 1]);
        assert_eq!(decode_frame(&mut buf).unwrap(), Some(vec![sample(7)]));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(u32::MAX);
        assert!(matches!(
            decode_frame(&mut buf),
            Err(CodecError::FrameTooLarge { .. })
        ));
    }
}
