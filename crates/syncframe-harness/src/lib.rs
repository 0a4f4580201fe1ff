//! In-process harness for syncframe end-to-end testing.
//!
//! Links the client runtime to a server [`syncframe_server::App`] without
//! sockets: [`LoopbackTransport`] implements the client transport by calling
//! the app directly, and [`Browser`] scripts a tab on top of it (clicks,
//! typing, submits, back/forward).
//!
//! # Invariant Testing
//!
//! The `invariants` module captures the app and its tabs into a
//! [`SystemSnapshot`] and checks behavioral properties against it. Use
//! [`InvariantRegistry::standard()`] for the common checks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod browser;
mod error;
pub mod invariants;
pub mod loopback;

pub use browser::Browser;
pub use error::HarnessError;
pub use invariants::{
    Invariant, InvariantRegistry, InvariantResult, ListenersMatchMarkup, OnePanelPerConnection, ServerSnapshot,
    SystemSnapshot, TabSnapshot, TabsAreRegistered, Violation,
};
pub use loopback::LoopbackTransport;
