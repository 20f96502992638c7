// src/error.rs

use std::io;
use thiserror::Error;

/// Errors raised while encoding an outbound FIX payload.
#[derive(Error, Debug)]
pub enum CodecError {
    /// A required tag was absent or blank. In practice this is always
    /// tag 35 (MsgType), which every encode needs.
    #[error("Missing required tag: {0}")]
    MissingTag(u32),

    #[error("Encoded payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    /// A field value contained a code point above U+00FF and cannot be
    /// written as ISO-Latin-1.
    #[error("Value for tag {tag} is not Latin-1 encodable")]
    NonLatin1 { tag: u32 },
}

/// Errors surfaced by the log scanner. Malformed message fragments are
/// skipped silently; only real I/O trouble becomes an error.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Read failure: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Result type alias for scanner operations
pub type ScanResult<T> = Result<T, ScanError>;
