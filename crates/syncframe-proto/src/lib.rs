//! Syncframe wire protocol.
//!
//! Messages exchanged between the server-side dispatcher and the client
//! runtime over the persistent channel, plus the HTTP header and markup
//! attribute names both sides agree on.
//!
//! # Message flow
//!
//! - The client sends [`ClientMessage::Action`] whenever a bound DOM event
//!   fires.
//! - The server answers with zero or more [`ServerMessage`]s: an instruction
//!   set ([`ServerMessage::Morph`]), a redirect, or the initial
//!   [`ServerMessage::Hello`] carrying the connection id.
//!
//! Messages are JSON envelopes of the form `{"event": ..., "data": ...}`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod event;
pub mod names;
mod message;

pub use errors::{ProtocolError, Result};
pub use event::EventType;
pub use message::{
    ActionMessage, ClientMessage, DOCUMENT_TARGET, Hello, Instructions, ServerMessage, Trigger,
};
