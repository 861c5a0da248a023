//! # Codec
//!
//! Compact, self-describing binary encoding of record batches.
//!
//! ## Layout
//!
//! All integers are big-endian.
//!
//! ```text
//! frame   := u32 len | batch            (len = byte length of batch)
//! batch   := u32 count | record*
//! record  := u8 tag | fields            (1 sample, 2 image, 3 video, 4 command, 5 static)
//! value   := u8 tag | body              (0 null .. 8 map)
//! array   := u8 kind | u32 count | element*   (kind declares element width)
//! ```
//!
//! Maps are written in key order, so encoding is deterministic.

mod error;
mod frame;
mod record;
mod value;

pub use error::CodecError;
pub use frame::{decode_frame, encode_frame, FRAME_HEADER_LEN, MAX_FRAME_LEN};
pub use record::{decode, encode};
pub use value::{decode_value, encode_value};
