//! Protocol error types.

use thiserror::Error;

/// Errors produced while encoding or decoding wire messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// The message was not valid JSON or did not match any known envelope.
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Convenience result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
