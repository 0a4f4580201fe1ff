//! Harness error types.

use syncframe_client::ClientError;
use thiserror::Error;

/// Errors raised while scripting a browser tab.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The client runtime or its transport failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// No element with this id in the current document.
    #[error("no element with id {0:?}")]
    MissingElement(String),

    /// No server message arrived in time.
    #[error("timed out waiting for the server")]
    Timeout,

    /// The server closed the channel.
    #[error("channel closed")]
    Closed,
}
