//! Client runtime state machine.
//!
//! [`ClientRuntime`] owns the live document and turns [`ClientEvent`]s into
//! [`ClientAction`]s. It performs no I/O: the caller sends the messages,
//! performs the fetches and reports the results back.

use serde_json::Value;
use syncframe_core::{Document, NodeId, NoopObserver, dom::parse_document, reconcile};
use syncframe_proto::{
    ActionMessage, ClientMessage, EventType, Instructions, ServerMessage,
    names::{MORPH_EVENT, MORPH_ROOT_ATTRIBUTE, MOUNT_ATTRIBUTE},
};
use tracing::{debug, trace, warn};

use crate::{
    binding::{self, Binding, Listener},
    error::ClientError,
    event::{ClientAction, ClientEvent, FetchRequest, FetchResponse, ScrollTarget},
    form,
    navigation::{self, History, MAX_REDIRECT_HOPS},
};

/// Client runtime for one browser tab.
#[derive(Debug, Clone)]
pub struct ClientRuntime {
    document: Document,
    listeners: Vec<Listener>,
    history: History,
    connection_id: Option<String>,
    scroll: Option<ScrollTarget>,
}

impl ClientRuntime {
    /// Load the page served at `url`.
    pub fn load(url: impl Into<String>, html: &str) -> Self {
        let url = url.into();
        let mut runtime = Self {
            document: parse_document(html),
            listeners: Vec::new(),
            history: History::new(url),
            connection_id: None,
            scroll: None,
        };
        runtime.scroll = runtime.scroll_target_for(runtime.history.current());
        runtime.rebind();
        runtime
    }

    /// The live document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Registered listeners.
    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    /// Current location.
    pub fn location(&self) -> &str {
        self.history.current()
    }

    /// Session history.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Connection id announced by the server, once connected.
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Token for claiming the page's pending mount.
    pub fn mount_token(&self) -> Option<&str> {
        self.root_element().and_then(|html| self.document.attr(html, MOUNT_ATTRIBUTE))
    }

    /// Scroll position requested by the last navigation.
    pub fn scroll_target(&self) -> Option<&ScrollTarget> {
        self.scroll.as_ref()
    }

    /// `true` if the document opted into morph navigation.
    pub fn morph_enabled(&self) -> bool {
        self.root_element().and_then(|html| self.document.attr(html, MORPH_ROOT_ATTRIBUTE)) == Some("true")
    }

    /// Element by `id` attribute.
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.document.get_element_by_id(id)
    }

    /// Type into an input or textarea.
    pub fn set_value(&mut self, node: NodeId, value: impl Into<String>) {
        if let Some(element) = self.document.element_mut(node) {
            element.live.value = value.into();
            element.live.dirty_value = true;
        }
    }

    /// Check or uncheck a checkbox or radio. Checking a radio unchecks the
    /// others of its group in the same form.
    pub fn set_checked(&mut self, node: NodeId, checked: bool) {
        let Some(element) = self.document.element(node) else { return };
        let is_radio = element.attr("type").is_some_and(|kind| kind.eq_ignore_ascii_case("radio"));
        let group = element.attr("name").map(str::to_string);

        if checked && is_radio {
            if let Some(group) = group {
                let scope = form::closest_form(&self.document, node).unwrap_or_else(|| self.document.root());
                let peers: Vec<NodeId> = self
                    .document
                    .descendants(scope)
                    .into_iter()
                    .filter(|&peer| {
                        peer != node
                            && self.document.element(peer).is_some_and(|e| {
                                e.is_checkable() && e.attr("name") == Some(group.as_str())
                            })
                    })
                    .collect();
                for peer in peers {
                    if let Some(element) = self.document.element_mut(peer) {
                        element.live.checked = false;
                    }
                }
            }
        }
        if let Some(element) = self.document.element_mut(node) {
            element.live.checked = checked;
            element.live.dirty_checked = true;
        }
    }

    /// Select the option at `index` of a select element.
    pub fn select_option(&mut self, select: NodeId, index: usize) {
        let options: Vec<NodeId> = self
            .document
            .descendants(select)
            .into_iter()
            .filter(|&node| self.document.tag(node) == Some("option"))
            .collect();
        for (i, option) in options.into_iter().enumerate() {
            if let Some(element) = self.document.element_mut(option) {
                element.live.selected = i == index;
            }
        }
    }

    /// Process an event and return the actions to execute.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::Dom { event, target } => self.fire(event, target),
            ClientEvent::Server(message) => Ok(self.receive(message)),
            ClientEvent::FetchCompleted { request, response } => self.complete_fetch(request, response),
            ClientEvent::Back => Ok(self.traverse(|history| history.back().map(str::to_string))),
            ClientEvent::Forward => Ok(self.traverse(|history| history.forward().map(str::to_string))),
        }
    }

    fn fire(&mut self, event: EventType, target: NodeId) -> Result<Vec<ClientAction>, ClientError> {
        let connected = target.index() < self.document.arena_len()
            && self.document.element(target).is_some()
            && self.document.is_connected(target);
        if !connected {
            return Err(ClientError::UnknownTarget(target.index()));
        }

        // Submit events are dispatched to the form itself.
        let target = match event {
            EventType::Submit => match form::closest_form(&self.document, target) {
                Some(form) => form,
                None => return Ok(Vec::new()),
            },
            _ => target,
        };

        let reached = binding::propagation_path(&self.document, &self.listeners, event, target);
        let prevented = !reached.is_empty();
        let mut actions = Vec::new();
        for listener in reached {
            match &listener.binding {
                Binding::Action { name, payload } => {
                    let payload = payload.clone().map_or(Value::Null, Value::String);
                    let message = ActionMessage::new(name.clone())
                        .with_trigger(form::trigger(&self.document, target))
                        .with_payload(payload);
                    debug!("{event} on {target:?} ▷ ACTION {name}");
                    actions.push(ClientAction::Send(ClientMessage::Action(message)));
                },
                Binding::Submit { name } => {
                    let data = form::form_data(&self.document, listener.element);
                    debug!("submit ▷ ACTION {name}");
                    actions.push(ClientAction::Send(ClientMessage::Action(
                        ActionMessage::new(name.clone()).with_payload(Value::Object(data)),
                    )));
                },
                Binding::Morph { href } => {
                    let url = navigation::resolve(self.location(), href);
                    actions.push(ClientAction::Fetch(self.fetch_request(url, 0)));
                },
            }
        }

        if event == EventType::Click && !prevented {
            if let Some(form) = form::submitted_form(&self.document, target) {
                actions.extend(self.fire(EventType::Submit, form)?);
            }
        }
        Ok(actions)
    }

    fn fetch_request(&self, url: String, hops: usize) -> FetchRequest {
        FetchRequest { url, connection_id: self.connection_id.clone(), hops, push_history: true }
    }

    fn receive(&mut self, message: ServerMessage) -> Vec<ClientAction> {
        match message {
            ServerMessage::Hello(hello) => {
                debug!("connected as {}", hello.connection_id);
                self.connection_id = Some(hello.connection_id);
                Vec::new()
            },
            ServerMessage::Morph(instructions) => {
                self.apply(&instructions);
                Vec::new()
            },
            ServerMessage::Redirect(url) => {
                let url = navigation::resolve(self.location(), &url);
                vec![ClientAction::Fetch(self.fetch_request(url, 0))]
            },
        }
    }

    fn complete_fetch(
        &mut self,
        request: FetchRequest,
        response: FetchResponse,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if let Some(redirect) = response.redirect {
            let url = navigation::resolve(&request.url, &redirect);
            if request.hops >= MAX_REDIRECT_HOPS {
                return Err(ClientError::TooManyRedirects { url, hops: request.hops });
            }
            debug!("{} redirected to {url}", request.url);
            return Ok(vec![ClientAction::Fetch(self.fetch_request(url, request.hops + 1))]);
        }

        self.morph_document(&response.body);
        if request.push_history {
            self.history.push(request.url.clone());
        }

        let mut actions = Vec::new();
        self.scroll = self.scroll_target_for(&request.url);
        if let Some(target) = self.scroll.clone() {
            actions.push(ClientAction::ScrollTo(target));
        }
        actions.push(ClientAction::DocumentEvent(MORPH_EVENT));
        Ok(actions)
    }

    fn traverse(&mut self, step: impl FnOnce(&mut History) -> Option<String>) -> Vec<ClientAction> {
        match step(&mut self.history) {
            Some(url) => {
                let mut request = self.fetch_request(url, 0);
                request.push_history = false;
                vec![ClientAction::Fetch(request)]
            },
            None => Vec::new(),
        }
    }

    fn scroll_target_for(&self, url: &str) -> Option<ScrollTarget> {
        match navigation::fragment(url) {
            Some(id) => self.document.get_element_by_id(id).map(|_| ScrollTarget::Element(id.to_string())),
            None => Some(ScrollTarget::Top),
        }
    }

    /// Apply an instruction set to the live document.
    ///
    /// A full-document entry replaces everything else in the set. Otherwise
    /// each target is reconciled, then classes and attributes are updated,
    /// and finally the listeners are rebuilt.
    pub fn apply(&mut self, instructions: &Instructions) {
        if let Some(html) = instructions.document_html() {
            self.morph_document(html);
            return;
        }

        for (target, html) in &instructions.elements_to_sync {
            let Some(node) = self.select(target) else {
                warn!("Sync action failed: no such element in current document: {target}");
                continue;
            };
            let source = parse_document(html);
            let Some(source_node) = source.children(source.root()).iter().copied().find(|&n| source.element(n).is_some())
            else {
                warn!("Sync action failed: no element in markup for {target}");
                continue;
            };
            let summary = reconcile(&mut self.document, node, &source, source_node, &mut NoopObserver);
            trace!("reconciled {target}: {summary:?}");
        }

        for (target, classes) in &instructions.css_classes_to_add {
            let Some(node) = self.select(target) else { continue };
            for class in classes {
                self.document.add_class(node, class.trim_start_matches('.'));
            }
        }
        for (target, classes) in &instructions.css_classes_to_remove {
            let Some(node) = self.select(target) else { continue };
            for class in classes {
                self.document.remove_class(node, class.trim_start_matches('.'));
            }
        }
        for (target, attributes) in &instructions.attributes_to_set {
            let Some(node) = self.select(target) else { continue };
            for (name, value) in attributes {
                self.document.set_attr(node, name, value.clone());
            }
        }
        for (target, attributes) in &instructions.attributes_to_remove {
            let Some(node) = self.select(target) else { continue };
            for name in attributes {
                self.document.remove_attr(node, name);
            }
        }

        self.rebind();
    }

    fn morph_document(&mut self, html: &str) {
        let source = parse_document(html);
        let root = self.document.root();
        let summary = reconcile(&mut self.document, root, &source, source.root(), &mut NoopObserver);
        trace!("reconciled document: {summary:?}");
        self.rebind();
    }

    fn select(&self, target: &str) -> Option<NodeId> {
        target.strip_prefix('#').and_then(|id| self.document.get_element_by_id(id))
    }

    fn root_element(&self) -> Option<NodeId> {
        self.document.elements_by_tag("html").first().copied()
    }

    fn rebind(&mut self) {
        self.listeners = binding::collect(&self.document, self.morph_enabled());
        trace!("{} listeners bound", self.listeners.len());
    }
}
