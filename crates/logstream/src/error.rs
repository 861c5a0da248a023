//! LogStream error types

use std::path::PathBuf;

use thiserror::Error;

/// Log stream errors
#[derive(Debug, Error)]
pub enum LogStreamError {
    /// IO error (open, write, rename, decompress)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame could not be encoded/decoded
    #[error("codec error: {0}")]
    Codec(#[from] codec::CodecError),

    /// Writer was closed explicitly
    #[error("log writer for '{}' is closed", path.display())]
    Closed { path: PathBuf },
}
