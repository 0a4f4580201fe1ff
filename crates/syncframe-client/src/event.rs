//! Client events and actions.

use syncframe_core::NodeId;
use syncframe_proto::{
    ClientMessage, EventType, ServerMessage,
    names::{CONNECTION_ID_HEADER, MORPH_HEADER},
};

use crate::navigation;

/// Events the caller feeds into the runtime.
///
/// The caller is responsible for:
/// - Reporting DOM events the user triggers
/// - Forwarding messages received on the server channel
/// - Completing the fetches the runtime asks for
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A DOM event fired on `target`.
    Dom {
        /// Event type.
        event: EventType,
        /// Element the event was dispatched to.
        target: NodeId,
    },

    /// Message received from the server channel.
    Server(ServerMessage),

    /// A fetch requested through [`ClientAction::Fetch`] finished.
    FetchCompleted {
        /// The request as it was issued.
        request: FetchRequest,
        /// What the server answered.
        response: FetchResponse,
    },

    /// Browser back button.
    Back,

    /// Browser forward button.
    Forward,
}

/// Actions the runtime produces for the caller to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Send a message on the server channel.
    Send(ClientMessage),

    /// Perform a morph-navigation fetch and report it back with
    /// [`ClientEvent::FetchCompleted`].
    Fetch(FetchRequest),

    /// Scroll the viewport.
    ScrollTo(ScrollTarget),

    /// Dispatch a named event on the document.
    DocumentEvent(&'static str),
}

/// A morph-navigation fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Target URL, fragment included.
    pub url: String,
    /// Live connection id sent in the `socket-id` header.
    pub connection_id: Option<String>,
    /// Redirects followed to get here.
    pub hops: usize,
    /// Push the landed URL onto the history stack.
    pub push_history: bool,
}

impl FetchRequest {
    /// Request target sent over HTTP: the URL without its fragment.
    pub fn target(&self) -> &str {
        navigation::without_fragment(&self.url)
    }

    /// Headers marking the request as a morph fetch.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![(MORPH_HEADER, "true".to_string())];
        if let Some(id) = &self.connection_id {
            headers.push((CONNECTION_ID_HEADER, id.clone()));
        }
        headers
    }
}

/// Answer to a [`FetchRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status.
    pub status: u16,
    /// Value of the `s-redirect` header.
    pub redirect: Option<String>,
    /// Document markup.
    pub body: String,
}

/// Where to scroll after a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrollTarget {
    /// Bring the element with this id into view.
    Element(String),
    /// Reset the `main` element to its top.
    Top,
}
