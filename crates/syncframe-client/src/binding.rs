//! Listener bookkeeping.
//!
//! Listeners live in one flat list that is thrown away and rebuilt from the
//! markup after every reconciliation, so the list always reflects the
//! current `s-<event>` attributes.

use syncframe_core::{Document, NodeId};
use syncframe_proto::{
    EventType,
    names::{PAYLOAD_ATTRIBUTE, SUBMIT_ATTRIBUTE},
};

use crate::navigation;

/// What a listener does when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Send an action with the element's literal payload.
    Action {
        /// Action name from `s-<event>`.
        name: String,
        /// Value of `s-payload`, if present.
        payload: Option<String>,
    },
    /// Send an action carrying the serialized form.
    Submit {
        /// Action name from `s-submit`.
        name: String,
    },
    /// Navigate by morphing to the anchor's target.
    Morph {
        /// The anchor's `href`.
        href: String,
    },
}

/// One registered listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    /// Event type listened for.
    pub event: EventType,
    /// Element the listener is attached to.
    pub element: NodeId,
    /// Handler.
    pub binding: Binding,
}

/// Collect the listeners the markup of `doc` declares.
///
/// Morph listeners come first, then `s-<event>` bindings in event type
/// order, then form submit bindings.
pub fn collect(doc: &Document, morph: bool) -> Vec<Listener> {
    let mut listeners = Vec::new();

    if morph {
        for anchor in doc.elements_by_tag("a") {
            let Some(element) = doc.element(anchor) else { continue };
            let Some(href) = element.attr("href") else { continue };
            if navigation::is_morphable(href, element.attr("target"), element.has_attr("download")) {
                listeners.push(Listener {
                    event: EventType::Click,
                    element: anchor,
                    binding: Binding::Morph { href: href.to_string() },
                });
            }
        }
    }

    for event in EventType::ATTRIBUTE_BOUND {
        let attribute = event.binding_attribute();
        for element in doc.elements_with_attr(&attribute) {
            let name = doc.attr(element, &attribute).unwrap_or("").to_string();
            let payload = doc.attr(element, PAYLOAD_ATTRIBUTE).map(str::to_string);
            listeners.push(Listener { event, element, binding: Binding::Action { name, payload } });
        }
    }

    for form in doc.elements_by_tag("form") {
        if let Some(name) = doc.attr(form, SUBMIT_ATTRIBUTE) {
            listeners.push(Listener {
                event: EventType::Submit,
                element: form,
                binding: Binding::Submit { name: name.to_string() },
            });
        }
    }

    listeners
}

/// `focus` and `blur` only reach listeners on the target itself.
pub fn bubbles(event: EventType) -> bool {
    !matches!(event, EventType::Focus | EventType::Blur)
}

/// Listeners an event dispatched to `target` reaches, in firing order:
/// the target's own listeners, then each ancestor's.
pub fn propagation_path<'a>(
    doc: &Document,
    listeners: &'a [Listener],
    event: EventType,
    target: NodeId,
) -> Vec<&'a Listener> {
    let path: Vec<NodeId> = if bubbles(event) {
        std::iter::once(target).chain(doc.ancestors(target)).collect()
    } else {
        vec![target]
    };
    path.into_iter()
        .flat_map(move |node| {
            listeners.iter().filter(move |listener| listener.element == node && listener.event == event)
        })
        .collect()
}
