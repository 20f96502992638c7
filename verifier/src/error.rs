use fixlab_common::error::{CodecError, ScanError};
use std::io;
use thiserror::Error;

/// Errors raised by the verifier's runners and loaders.
#[derive(Error, Debug)]
pub enum VerifyError {
    /// Scenario or runner configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors raised by a transport implementation. Close failures suppress
/// any earlier error already being propagated.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Close failed: {0}")]
    Close(String),

    #[error("Unknown transport factory: {0}")]
    UnknownFactory(String),
}

/// Result type alias for verifier operations
pub type VerifyResult<T> = Result<T, VerifyError>;
