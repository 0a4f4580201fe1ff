//! Syncframe core
//!
//! Pure, I/O-free building blocks shared by the server and the client
//! runtime.
//!
//! # Components
//!
//! - [`dom`]: index-addressed node arena with a tolerant HTML parser and a
//!   serializer that keeps template tags verbatim
//! - [`template`]: the render-time template language (`<%= %>`, `<% if %>`,
//!   `<% for %>`) evaluated against JSON scopes
//! - [`directive`]: expansion of conditional-class attributes into template
//!   expressions
//! - [`reconcile`]: structural diff/patch of a live document against freshly
//!   rendered markup

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod directive;
pub mod dom;
mod error;
pub mod reconcile;
pub mod template;

pub use dom::{Attribute, Document, Element, LiveState, Node, NodeId, NodeKind};
pub use error::TemplateError;
pub use reconcile::{NoopObserver, ReconcileObserver, Reconciliation, reconcile};
pub use template::{Scope, Template};
