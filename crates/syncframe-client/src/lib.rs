//! Client
//!
//! Event-driven client runtime for syncframe pages. Binds declarative
//! `s-<event>` attributes, packages actions, applies the server's
//! instruction sets to the live document and performs morph navigation.
//!
//! # Architecture
//!
//! The runtime follows a Sans-IO, action-based design. It receives events
//! ([`ClientEvent`]): DOM events, server messages and completed fetches. It
//! processes them against its [`syncframe_core::Document`] and returns
//! actions ([`ClientAction`]) for the caller to execute. [`Driver`] executes
//! those actions over any [`Transport`].
//!
//! # Components
//!
//! - [`ClientRuntime`]: live document, listeners and history
//! - [`binding`]: the flat listener list rebuilt after every update
//! - [`form`]: `FormData` serialization and trigger descriptors
//! - [`navigation`]: morphable links, URL resolution, history
//! - [`Driver`] / [`Transport`]: async execution of runtime actions
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::WebSocketTransport`]: WebSocket channel with HTTP fetches
//! - [`transport::connect`]: Load a page and open its channel

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod binding;
mod driver;
mod error;
mod event;
pub mod form;
pub mod navigation;
mod runtime;

#[cfg(feature = "transport")]
pub mod transport;

pub use driver::{Driver, Transport};
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent, FetchRequest, FetchResponse, ScrollTarget};
pub use runtime::ClientRuntime;
pub use syncframe_core::NodeId;
pub use syncframe_proto::EventType;
