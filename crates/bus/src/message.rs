//! Published message: `[topic, payload]`

use bytes::Bytes;

use crate::wire::encode_message;
use crate::BusError;

/// A message routed by topic prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Wire encoding as a two-frame message
    pub fn encode(&self) -> Bytes {
        encode_message(&[self.topic.as_bytes(), &self.payload[..]])
    }

    /// Build from the frames of one wire message
    pub fn from_frames(mut frames: Vec<Bytes>) -> Result<Self, BusError> {
        if frames.len() != 2 {
            return Err(BusError::protocol(format!(
                "expected [topic, payload], got {} frames",
                frames.len()
            )));
        }
        let payload = frames.pop().unwrap_or_default();
        let topic_raw = frames.pop().unwrap_or_default();
        let topic = String::from_utf8(topic_raw.to_vec())
            .map_err(|_| BusError::protocol("topic is not valid UTF-8"))?;
        Ok(Self { topic, payload })
    }

    /// Byte-prefix topic match
    pub fn matches(&self, prefix: &[u8]) -> bool {
        self.topic.as_bytes().starts_with(prefix)
    }
}
