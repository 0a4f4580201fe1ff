//! Per-connection application state.

use serde_json::{Map, Value};

/// Open-ended JSON object owned by one live connection.
///
/// Handlers receive it by value and hand it back; the dispatcher keeps the
/// pre-action copy so a failing handler leaves the connection untouched.
pub type ConnectionState = Map<String, Value>;

/// Key under which the public view of the open panel is published.
pub const PANEL_KEY: &str = "panel";

/// Key holding per-field validation messages.
pub const FORM_ERRORS_KEY: &str = "_formErrors";
