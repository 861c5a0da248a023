//! Multi-frame message framing
//!
//! ```text
//! u32 frame_count | (u32 len | bytes) * frame_count      (big-endian)
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::BusError;

/// Most frames accepted in one message
pub const MAX_FRAMES: usize = 16;

/// Largest single frame accepted (256 MiB)
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Control verb sent by subscribers
pub const SUBSCRIBE: &[u8] = b"sub";

/// Broker acknowledgement of a subscription
pub const SUBSCRIBED: &[u8] = b"subscribed";

/// Encode frames into one contiguous message
pub fn encode_message(frames: &[&[u8]]) -> Bytes {
    let body: usize = frames.iter().map(|f| 4 + f.len()).sum();
    let mut out = BytesMut::with_capacity(4 + body);
    out.put_u32(frames.len() as u32);
    for frame in frames {
        out.put_u32(frame.len() as u32);
        out.put_slice(frame);
    }
    out.freeze()
}

/// Write one message
pub async fn write_message<W>(writer: &mut W, frames: &[&[u8]]) -> Result<(), BusError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_message(frames)).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one message; `Ok(None)` when the peer closed the connection
/// between messages
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Vec<Bytes>>, BusError>
where
    R: AsyncRead + Unpin,
{
    let count = match reader.read_u32().await {
        Ok(count) => count as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if count > MAX_FRAMES {
        return Err(BusError::protocol(format!(
            "message declares {count} frames (max {MAX_FRAMES})"
        )));
    }

    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        let len = reader.read_u32().await? as usize;
        if len > MAX_FRAME_LEN {
            return Err(BusError::FrameTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        let mut frame = vec![0u8; len];
        reader.read_exact(&mut frame).await?;
        frames.push(Bytes::from(frame));
    }
    Ok(Some(frames))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_message_layout() {
        let encoded = encode_message(&[&b"/t"[..], &b"xyz"[..]]);
        assert_eq!(
            &encoded[..],
            &[0, 0, 0, 2, 0, 0, 0, 2, b'/', b't', 0, 0, 0, 3, b'x', b'y', b'z']
        );
    }

    #[tokio::test]
    async fn test_read_back_and_clean_eof() {
        let mut raw = encode_message(&[&b"a"[..], &b""[..]]).to_vec();
        raw.extend_from_slice(&encode_message(&[SUBSCRIBE, &b"/camera/"[..]]));
        let mut reader = &raw[..];

        let first = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(first, vec![Bytes::from_static(b"a"), Bytes::new()]);
        let second = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(second[0], Bytes::from_static(SUBSCRIBE));
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_frame_is_an_error() {
        let raw = encode_message(&[&b"topic"[..], &b"payload"[..]]);
        let mut reader = &raw[..raw.len() - 2];
        assert!(matches!(
            read_message(&mut reader).await,
            Err(BusError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_limits() {
        let mut raw = BytesMut::new();
        raw.put_u32(MAX_FRAMES as u32 + 1);
        let mut reader = &raw[..];
        assert!(matches!(
            read_message(&mut reader).await,
            Err(BusError::Protocol(_))
        ));

        let mut raw = BytesMut::new();
        raw.put_u32(1);
        raw.put_u32(u32::MAX);
        let mut reader = &raw[..];
        assert!(matches!(
            read_message(&mut reader).await,
            Err(BusError::FrameTooLarge { .. })
        ));
    }
}
