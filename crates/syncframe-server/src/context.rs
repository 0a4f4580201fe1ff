//! Render context handed to route handlers.
//!
//! One [`RenderContext`] exists per handler invocation. It carries the
//! request data (trigger, payload, params, query, env, session) and collects
//! everything the handler emits: renders, class and attribute mutations,
//! redirects and error pages. The caller turns the collected emissions into
//! an HTTP response (mount) or wire messages (action).
//!
//! # Modes
//!
//! - **Mount** drives the HTTP GET. `render` always produces the full
//!   document and class/attribute mutations are unavailable.
//! - **Action** drives one client action. `render` produces the requested
//!   fragments plus any queued mutations as one instruction set.
//!
//! A redirect or error page ends the cycle: anything emitted afterwards is
//! dropped.

use std::{collections::BTreeMap, sync::Arc};

use serde_json::{Map, Value, json};
use syncframe_core::Scope;
use syncframe_proto::{Instructions, ServerMessage, Trigger};
use tracing::{debug, error, info, warn};

use crate::{
    compiler::CompiledRoute,
    error::HandlerError,
    instructions::{PendingMutations, is_valid_id},
    module::HandlerTable,
    panel::PanelChange,
    session::Session,
    state::ConnectionState,
    store::AppStore,
};

/// Request environment exposed to templates as `env`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    /// Request path.
    pub path: String,
    /// Host name from the `Host` header.
    pub hostname: String,
    /// Peer address.
    pub ip: String,
}

impl Env {
    /// Template value.
    pub fn to_value(&self) -> Value {
        json!({ "path": self.path, "hostname": self.hostname, "ip": self.ip })
    }
}

/// What a render should produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targets {
    /// The whole document.
    Document,
    /// The listed `#id` elements.
    Ids(Vec<String>),
    /// Only elements queued with [`RenderContext::include`].
    None,
}

impl Targets {
    /// A single element.
    pub fn id(id: impl Into<String>) -> Self {
        Self::Ids(vec![id.into()])
    }

    /// Several elements.
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Ids(ids.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mode {
    Mount,
    Action { name: String },
}

/// One output of a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Emission {
    Instructions(Instructions),
    Redirect(String),
    Document { status: u16, html: String },
}

/// Request data plus the emission buffer for one handler call.
pub struct RenderContext {
    mode: Mode,
    route: Arc<CompiledRoute>,
    store: Arc<AppStore>,
    /// Element that fired the action.
    pub trigger: Option<Trigger>,
    /// Action payload (form data for submits).
    pub payload: Value,
    /// Route parameters.
    pub params: BTreeMap<String, String>,
    /// Query string of the page request.
    pub query: BTreeMap<String, String>,
    /// Request environment.
    pub env: Env,
    /// The visitor's session. Saved after the handler if modified.
    pub session: Session,
    /// State the open panel was created with, during panel submit/button.
    pub panel_state: Option<Value>,
    included: Vec<String>,
    mutations: PendingMutations,
    outbox: Vec<Emission>,
    finished: bool,
    panel_changes: Vec<PanelChange>,
}

/// Request data shared by both modes.
#[derive(Debug, Clone, Default)]
pub(crate) struct RequestData {
    pub trigger: Option<Trigger>,
    pub payload: Value,
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub env: Env,
}

impl RenderContext {
    pub(crate) fn new(
        mode: Mode,
        route: Arc<CompiledRoute>,
        store: Arc<AppStore>,
        request: RequestData,
        session: Session,
    ) -> Self {
        Self {
            mode,
            route,
            store,
            trigger: request.trigger,
            payload: request.payload,
            params: request.params,
            query: request.query,
            env: request.env,
            session,
            panel_state: None,
            included: Vec::new(),
            mutations: PendingMutations::default(),
            outbox: Vec::new(),
            finished: false,
            panel_changes: Vec::new(),
        }
    }

    /// The compiled route being served.
    pub fn route(&self) -> &Arc<CompiledRoute> {
        &self.route
    }

    /// The route's action table.
    pub fn handlers(&self) -> &HandlerTable {
        self.route.handlers()
    }

    /// Application-scoped store.
    pub fn store(&self) -> &Arc<AppStore> {
        &self.store
    }

    /// Name of the running action. `None` during mount.
    pub fn action_name(&self) -> Option<&str> {
        match &self.mode {
            Mode::Action { name } => Some(name),
            Mode::Mount => None,
        }
    }

    /// `true` while serving the HTTP GET.
    pub fn is_mount(&self) -> bool {
        matches!(self.mode, Mode::Mount)
    }

    /// Render `targets` against `state` and emit the result.
    ///
    /// Drains pending flash messages and queued mutations. Returns `state`
    /// so handlers can end with `Ok(Some(ctx.render(state, ...)))`.
    pub fn render(&mut self, state: ConnectionState, targets: Targets) -> ConnectionState {
        if self.finished {
            debug!("render after redirect ignored");
            return state;
        }

        let flash = self.session.take_flash();
        let scope = Scope::new()
            .with("$", Value::Object(state.clone()))
            .with("flash", Value::Object(flash))
            .with("env", self.env.to_value())
            .with("error", Value::Object(Map::new()))
            .with("params", json!(self.params));

        match self.mode.clone() {
            Mode::Mount => {
                if targets != Targets::Document {
                    error!("in mount, render always renders the full document; explicit targets ignored");
                }
                let html = self.route.render_document(&scope);
                self.outbox.push(Emission::Document { status: 200, html });
            },
            Mode::Action { name } => {
                let mut instructions = Instructions::default();
                match targets {
                    Targets::Document => {
                        self.included.clear();
                        instructions = Instructions::document(self.route.render_document(&scope));
                    },
                    Targets::Ids(ids) => self.render_fragments(ids, &scope, &mut instructions),
                    Targets::None => self.render_fragments(Vec::new(), &scope, &mut instructions),
                }
                self.mutations.drain_into(&mut instructions);

                let rendered: Vec<&str> = instructions.elements_to_sync.keys().map(String::as_str).collect();
                let rendered = if rendered.is_empty() { "nothing".to_string() } else { rendered.join(", ") };
                info!(target: "syncframe::request", " ▷ ACTION {name} ▷ RENDER {rendered}");

                self.outbox.push(Emission::Instructions(instructions));
            },
        }

        state
    }

    fn render_fragments(&mut self, ids: Vec<String>, scope: &Scope, instructions: &mut Instructions) {
        let mut targets = ids;
        targets.append(&mut self.included);

        for id in targets {
            if instructions.elements_to_sync.contains_key(&id) || !is_valid_id(&id) {
                continue;
            }
            match self.route.render_fragment(&id, scope) {
                Some(html) => {
                    instructions.elements_to_sync.insert(id, html);
                },
                None => warn!("no element {id} in {}", self.route.endpoint()),
            }
        }
    }

    /// Send the client elsewhere. Ends the cycle.
    pub fn redirect(&mut self, state: ConnectionState, url: impl Into<String>) -> ConnectionState {
        if self.finished {
            debug!("redirect after redirect ignored");
            return state;
        }
        let url = url.into();
        if let Mode::Action { name } = &self.mode {
            info!(target: "syncframe::request", " ▷ ACTION {name} ▷ REDIRECT ▷ {url}");
        }
        self.outbox.push(Emission::Redirect(url));
        self.finished = true;
        state
    }

    /// Replace the page with the nearest 404 page. Ends the cycle.
    pub async fn not_found(&mut self, state: ConnectionState) -> ConnectionState {
        if let Mode::Action { name } = &self.mode {
            error!(" ▷ ACTION {name} ▷ 404 NOT FOUND");
        }
        self.emit_error_page(404, not_found_value(&self.env)).await;
        state
    }

    /// Replace the page with the nearest 500 page. Ends the cycle.
    pub async fn server_error(&mut self, state: ConnectionState, err: &HandlerError) -> ConnectionState {
        if let Mode::Action { name } = &self.mode {
            error!(" ▷ ACTION {name} ▷ 500 INTERNAL SERVER ERROR");
        }
        self.emit_error_page(500, error_value(&self.env, err)).await;
        state
    }

    async fn emit_error_page(&mut self, status: u16, error: Value) {
        if self.finished {
            debug!("error page after redirect ignored");
            return;
        }
        let dir = parent_dir(self.route.file()).to_string();
        let html = self.store.render_error_page(&dir, status, error, &self.env).await;
        self.outbox.push(Emission::Document { status, html });
        self.finished = true;
    }

    /// Queue classes to add to `id`.
    pub fn add_class(&mut self, id: &str, classes: &[&str]) -> &mut Self {
        if self.unavailable_in_mount("add_class") {
            return self;
        }
        self.mutations.add_classes(id, classes);
        self
    }

    /// Queue classes to remove from `id`.
    pub fn remove_class(&mut self, id: &str, classes: &[&str]) -> &mut Self {
        if self.unavailable_in_mount("remove_class") {
            return self;
        }
        self.mutations.remove_classes(id, classes);
        self
    }

    /// Queue `name="value"` on `id`.
    pub fn set_attribute(&mut self, id: &str, name: &str, value: &str) -> &mut Self {
        if self.unavailable_in_mount("set_attribute") {
            return self;
        }
        self.mutations.set_attribute(id, name, Some(value));
        self
    }

    /// Queue attribute removals on `id`.
    pub fn remove_attribute(&mut self, id: &str, names: &[&str]) -> &mut Self {
        if self.unavailable_in_mount("remove_attribute") {
            return self;
        }
        self.mutations.remove_attributes(id, names);
        self
    }

    /// Store a one-shot message shown by the next render.
    pub fn flash(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.session.flash(key, value.into());
        self
    }

    /// Store several one-shot messages.
    pub fn flash_all(&mut self, messages: Map<String, Value>) -> &mut Self {
        if messages.is_empty() {
            warn!("flash_all() needs at least one key/value pair");
            return self;
        }
        for (key, value) in messages {
            self.session.flash(key, value);
        }
        self
    }

    /// Render `id` with the next [`Self::render`].
    pub fn include(&mut self, id: impl Into<String>) -> &mut Self {
        let id = id.into();
        if !self.included.contains(&id) {
            self.included.push(id);
        }
        self
    }

    fn unavailable_in_mount(&self, method: &str) -> bool {
        let mount = self.is_mount();
        if mount {
            warn!("{method} is not available in mount");
        }
        mount
    }

    /// Drop everything emitted so far.
    pub(crate) fn discard_emissions(&mut self) {
        self.outbox.clear();
        self.included.clear();
        self.mutations = PendingMutations::default();
        self.finished = false;
    }

    pub(crate) fn record_panel_change(&mut self, change: PanelChange) {
        self.panel_changes.push(change);
    }

    /// Panel registry changes made during this cycle, oldest first.
    pub(crate) fn take_panel_changes(&mut self) -> Vec<PanelChange> {
        std::mem::take(&mut self.panel_changes)
    }

    pub(crate) fn take_emissions(&mut self) -> Vec<Emission> {
        std::mem::take(&mut self.outbox)
    }

    /// Emissions as wire messages.
    pub(crate) fn take_messages(&mut self) -> Vec<ServerMessage> {
        self.take_emissions()
            .into_iter()
            .map(|emission| match emission {
                Emission::Instructions(instructions) => ServerMessage::Morph(instructions),
                Emission::Redirect(url) => ServerMessage::Redirect(url),
                Emission::Document { html, .. } => ServerMessage::Morph(Instructions::document(html)),
            })
            .collect()
    }
}

pub(crate) fn not_found_value(env: &Env) -> Value {
    json!({
        "path": env.path,
        "name": "NotFound",
        "message": format!("{} was not found", env.path),
        "title": "Not Found",
    })
}

pub(crate) fn error_value(env: &Env, err: &HandlerError) -> Value {
    json!({
        "path": env.path,
        "name": err.name(),
        "message": err.message(),
        "title": "Internal Server Error",
    })
}

pub(crate) fn parent_dir(path: &str) -> &str {
    path.trim_start_matches('/').rsplit_once('/').map_or("", |(dir, _)| dir)
}
