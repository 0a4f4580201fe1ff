//! Client error types.

use syncframe_proto::ProtocolError;
use thiserror::Error;

/// Errors produced by the client runtime and its transports.
#[derive(Error, Debug)]
pub enum ClientError {
    /// A wire message could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport failed or was closed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A morph navigation kept redirecting.
    #[error("too many redirects navigating to {url} ({hops} hops)")]
    TooManyRedirects {
        /// The redirect target that was refused.
        url: String,
        /// Redirects followed so far.
        hops: usize,
    },

    /// An event was fired at a node that is not a connected element.
    #[error("event target {0} is not an element of the document")]
    UnknownTarget(usize),

    /// The loaded page carries no mount token, so no channel can be opened.
    #[error("page {0} has no mount token")]
    NoMountToken(String),
}
