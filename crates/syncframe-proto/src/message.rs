//! Client and server message envelopes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ProtocolError, Result};

/// Key in [`Instructions::elements_to_sync`] that stands for the whole
/// document rather than a single `#id` target.
pub const DOCUMENT_TARGET: &str = "html";

/// Element that caused an action: the event target's `id`, `name` and
/// current `value`. Browsers report empty strings for missing properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Element id (without `#`).
    #[serde(default)]
    pub id: String,
    /// Element `name` attribute.
    #[serde(default)]
    pub name: String,
    /// Element value at the time of the event.
    #[serde(default)]
    pub value: String,
}

/// One action invocation sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMessage {
    /// Name of the server-side action.
    pub action_name: String,
    /// Element that caused the action. Absent for form submissions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    /// Literal payload (`s-payload`) or serialized form data.
    #[serde(default)]
    pub payload: Value,
}

impl ActionMessage {
    /// Build an action message without trigger or payload.
    pub fn new(action_name: impl Into<String>) -> Self {
        Self { action_name: action_name.into(), trigger: None, payload: Value::Null }
    }

    /// Attach a trigger descriptor.
    #[must_use]
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Messages sent from the client runtime to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// A bound DOM event fired.
    #[serde(rename = "_syncAction_")]
    Action(ActionMessage),
}

impl ClientMessage {
    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Decode from a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

/// The instruction set produced by one render cycle.
///
/// Targets are `#id` selectors, or [`DOCUMENT_TARGET`] for a full-document
/// replacement. Class names keep the optional leading `.` they were given
/// with; the client strips it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instructions {
    /// Rendered markup keyed by target.
    #[serde(default)]
    pub elements_to_sync: BTreeMap<String, String>,
    /// Classes to add keyed by target id.
    #[serde(default)]
    pub css_classes_to_add: BTreeMap<String, Vec<String>>,
    /// Classes to remove keyed by target id.
    #[serde(default)]
    pub css_classes_to_remove: BTreeMap<String, Vec<String>>,
    /// Attributes to set keyed by target id.
    #[serde(default)]
    pub attributes_to_set: BTreeMap<String, BTreeMap<String, String>>,
    /// Attribute names to remove keyed by target id.
    #[serde(default)]
    pub attributes_to_remove: BTreeMap<String, Vec<String>>,
}

impl Instructions {
    /// Instruction set replacing the whole document.
    pub fn document(html: impl Into<String>) -> Self {
        let mut instructions = Self::default();
        instructions.elements_to_sync.insert(DOCUMENT_TARGET.to_string(), html.into());
        instructions
    }

    /// Full-document markup, if this is a document replacement.
    pub fn document_html(&self) -> Option<&str> {
        self.elements_to_sync.get(DOCUMENT_TARGET).map(String::as_str)
    }

    /// `true` if nothing would change on the client.
    pub fn is_empty(&self) -> bool {
        self.elements_to_sync.is_empty()
            && self.css_classes_to_add.is_empty()
            && self.css_classes_to_remove.is_empty()
            && self.attributes_to_set.is_empty()
            && self.attributes_to_remove.is_empty()
    }
}

/// Payload of the greeting sent when a channel opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    /// Id the client echoes in the `socket-id` header of morph fetches.
    pub connection_id: String,
}

/// Messages sent from the server to the client runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// Apply an instruction set.
    #[serde(rename = "_syncMorph_")]
    Morph(Instructions),
    /// Navigate to another route.
    #[serde(rename = "_syncRedirect_")]
    Redirect(String),
    /// Channel opened.
    #[serde(rename = "_syncHello_")]
    Hello(Hello),
}

impl ServerMessage {
    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Decode from a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}
