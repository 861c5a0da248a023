//! Codec error types

use thiserror::Error;

/// Encoding/decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended in the middle of a field
    #[error("truncated input: needed {needed} more bytes while reading {context}")]
    Truncated { context: &'static str, needed: usize },

    /// Unknown record/value/array tag
    #[error("unknown {context} tag {tag}")]
    UnknownTag { context: &'static str, tag: u8 },

    /// String field is not valid UTF-8
    #[error("invalid utf-8 in {context}")]
    InvalidUtf8 { context: &'static str },

    /// Bytes left after a complete batch
    #[error("{remaining} trailing bytes after batch")]
    TrailingBytes { remaining: usize },

    /// Length does not fit the u32 length prefix
    #[error("{context} too long to encode: {len} items")]
    TooLong { context: &'static str, len: usize },

    /// Lists/maps nested deeper than the decoder accepts
    #[error("value nesting exceeds {max} levels")]
    NestingTooDeep { max: usize },

    /// Declared frame length exceeds the sanity limit
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },
}

impl CodecError {
    pub(crate) fn truncated(context: &'static str, needed: usize) -> Self {
        Self::Truncated { context, needed }
    }

    pub(crate) fn unknown_tag(context: &'static str, tag: u8) -> Self {
        Self::UnknownTag { context, tag }
    }
}
