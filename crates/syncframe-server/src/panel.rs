//! Modal panels built on the action protocol.
//!
//! Opening a panel registers a [`PanelSession`] in the application-scoped
//! [`PanelRegistry`] and publishes a public view of it under `state.panel`.
//! The page template renders `#panel` from that view and its buttons fire
//! the built-in actions:
//!
//! - `_panelSubmit`: form submit. Coerces checkbox and numeric fields, closes
//!   the panel and runs the panel's submit action.
//! - `_panelBtn`: extra button. The payload is the button index.
//! - `_panelEasyClose`: click outside the panel. Closes only if the panel was
//!   opened with `easy_close`.
//! - `_panelValidate`: field change. Validates one field against the route
//!   module's [`crate::FieldSchema`].
//!
//! A connection has at most one open panel; opening another closes the first.
//! Registry changes are journaled on the [`RenderContext`] so a failed
//! handler can undo them together with its state changes.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    context::{RenderContext, Targets},
    error::PanelError,
    module::{HandlerResult, PanelAction, RouteModule},
    state::{ConnectionState, PANEL_KEY},
    validate::validate_trigger,
};

/// Element toggled open with `.is-open`.
pub const PANEL_CONTAINER_ID: &str = "#panel-container";
/// Element re-rendered on open and close.
pub const PANEL_ID: &str = "#panel";
const OPEN_CLASS: &str = ".is-open";

/// Input type of a panel field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Free text.
    Text,
    /// Multi-line text.
    Textarea,
    /// Base-10 integer.
    Number,
    /// Boolean checkbox.
    Checkbox,
}

/// One form field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelField {
    /// Form field name.
    pub name: String,
    /// Label text.
    pub label: String,
    /// Input type.
    pub kind: FieldKind,
    /// Initial value.
    pub value: Value,
}

impl PanelField {
    /// Field with a `null` initial value.
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self { name: name.into(), label: label.into(), kind, value: Value::Null }
    }

    /// Set the initial value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }
}

/// One extra button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelButton {
    /// Button text.
    pub label: String,
    /// Action run when pressed. `None` closes the panel.
    #[serde(skip)]
    pub action: Option<String>,
}

impl PanelButton {
    /// Button running `action`.
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self { label: label.into(), action: Some(action.into()) }
    }

    /// Button with no action of its own.
    pub fn plain(label: impl Into<String>) -> Self {
        Self { label: label.into(), action: None }
    }
}

/// How to open a panel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelOptions {
    /// Heading.
    pub title: String,
    /// Form fields.
    pub fields: Vec<PanelField>,
    /// Buttons in display order. The payload of `_panelBtn` indexes this list.
    pub buttons: Vec<PanelButton>,
    /// Opaque state handed back as `ctx.panel_state` on submit or button.
    pub state: Value,
    /// Close when the user clicks outside the panel.
    pub easy_close: bool,
    /// Action run by `_panelSubmit`.
    pub submit_action: Option<String>,
}

impl PanelOptions {
    /// Panel with a title and nothing else.
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), ..Self::default() }
    }

    /// Add a field.
    #[must_use]
    pub fn field(mut self, field: PanelField) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a button.
    #[must_use]
    pub fn button(mut self, button: PanelButton) -> Self {
        self.buttons.push(button);
        self
    }

    /// Set the state handed back on submit.
    #[must_use]
    pub fn state(mut self, state: impl Into<Value>) -> Self {
        self.state = state.into();
        self
    }

    /// Allow closing by clicking outside.
    #[must_use]
    pub fn easy_close(mut self) -> Self {
        self.easy_close = true;
        self
    }

    /// Run `action` on submit.
    #[must_use]
    pub fn submit_action(mut self, action: impl Into<String>) -> Self {
        self.submit_action = Some(action.into());
        self
    }
}

/// Server-side record of an open panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSession {
    /// Panel id (UUID v4).
    pub id: String,
    /// State from [`PanelOptions::state`].
    pub state: Value,
    /// Close on outside click.
    pub easy_close: bool,
    /// Action run on submit.
    pub submit_action: Option<String>,
    /// Per-button actions, by index.
    pub button_actions: Vec<Option<String>>,
    /// Fields coerced to booleans on submit.
    pub checkbox_fields: Vec<String>,
    /// Fields parsed as integers on submit.
    pub numeric_fields: Vec<String>,
}

impl PanelSession {
    fn from_options(id: String, options: &PanelOptions) -> Self {
        let names_of = |kind: FieldKind| -> Vec<String> {
            options.fields.iter().filter(|f| f.kind == kind).map(|f| f.name.clone()).collect()
        };
        Self {
            id,
            state: options.state.clone(),
            easy_close: options.easy_close,
            submit_action: options.submit_action.clone(),
            button_actions: options.buttons.iter().map(|b| b.action.clone()).collect(),
            checkbox_fields: names_of(FieldKind::Checkbox),
            numeric_fields: names_of(FieldKind::Number),
        }
    }

    /// Apply checkbox and numeric coercion to a submitted form.
    pub fn coerce(&self, payload: Value) -> Value {
        let mut form = match payload {
            Value::Object(form) => form,
            Value::Null => Map::new(),
            other => return other,
        };

        for name in &self.checkbox_fields {
            let checked = form.get(name).is_some_and(|v| !matches!(v, Value::Null | Value::Bool(false)));
            form.insert(name.clone(), Value::Bool(checked));
        }

        for name in &self.numeric_fields {
            let Some(Value::String(raw)) = form.get(name) else { continue };
            let parsed = match raw.trim().parse::<i64>() {
                Ok(number) => Value::from(number),
                Err(_) => {
                    warn!("panel field `{name}` is not a number: {raw:?}");
                    Value::Null
                },
            };
            form.insert(name.clone(), parsed);
        }

        Value::Object(form)
    }
}

/// Open panels, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct PanelRegistry {
    panels: Arc<Mutex<HashMap<String, PanelSession>>>,
}

impl PanelRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an open panel.
    pub fn get(&self, id: &str) -> Option<PanelSession> {
        self.panels.lock().unwrap_or_else(PoisonError::into_inner).get(id).cloned()
    }

    /// `true` if `id` is open.
    pub fn contains(&self, id: &str) -> bool {
        self.panels.lock().unwrap_or_else(PoisonError::into_inner).contains_key(id)
    }

    /// Number of open panels.
    pub fn len(&self) -> usize {
        self.panels.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `true` if no panel is open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, session: PanelSession) {
        let mut panels = self.panels.lock().unwrap_or_else(PoisonError::into_inner);
        panels.insert(session.id.clone(), session);
    }

    fn remove(&self, id: &str) -> Option<PanelSession> {
        self.panels.lock().unwrap_or_else(PoisonError::into_inner).remove(id)
    }
}

/// One registry change made while handling an action.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PanelChange {
    Opened(String),
    Closed(PanelSession),
}

/// Undo the registry changes journaled on `ctx`, newest first.
pub(crate) fn rollback(ctx: &mut RenderContext) {
    let store = Arc::clone(ctx.store());
    for change in ctx.take_panel_changes().into_iter().rev() {
        match change {
            PanelChange::Opened(id) => {
                debug!("rolling back panel {id}");
                store.panels().remove(&id);
            },
            PanelChange::Closed(session) => {
                debug!("restoring panel {}", session.id);
                store.panels().insert(session);
            },
        }
    }
}

/// Id of the panel open in `state`, if any.
pub fn open_panel_id(state: &ConnectionState) -> Option<&str> {
    state.get(PANEL_KEY)?.get("id")?.as_str()
}

/// Open a panel. Returns its id.
///
/// Fails if the submit action or a button action is not in the route's
/// handler table.
pub fn open(
    ctx: &mut RenderContext,
    state: &mut ConnectionState,
    options: PanelOptions,
) -> Result<String, PanelError> {
    let named = options.submit_action.iter().chain(options.buttons.iter().filter_map(|b| b.action.as_ref()));
    for action in named {
        if ctx.handlers().app_action(action).is_none() {
            return Err(PanelError::UnknownAction(action.clone()));
        }
    }

    if let Some(previous) = open_panel_id(state).map(str::to_string) {
        debug!("replacing open panel {previous}");
        if let Some(session) = ctx.store().panels().remove(&previous) {
            ctx.record_panel_change(PanelChange::Closed(session));
        }
    }

    let id = Uuid::new_v4().to_string();
    ctx.store().panels().insert(PanelSession::from_options(id.clone(), &options));
    ctx.record_panel_change(PanelChange::Opened(id.clone()));

    state.insert(
        PANEL_KEY.to_string(),
        json!({
            "id": id,
            "title": options.title,
            "fields": options.fields,
            "buttons": options.buttons,
        }),
    );

    ctx.add_class(PANEL_CONTAINER_ID, &[OPEN_CLASS]);
    ctx.include(PANEL_ID);
    Ok(id)
}

/// Close the open panel.
pub fn close(ctx: &mut RenderContext, state: &mut ConnectionState) -> Result<(), PanelError> {
    let id = open_panel_id(state).map(str::to_string).ok_or(PanelError::NotOpen)?;

    ctx.remove_class(PANEL_CONTAINER_ID, &[OPEN_CLASS]);
    if let Some(session) = ctx.store().panels().remove(&id) {
        ctx.record_panel_change(PanelChange::Closed(session));
    }
    state.insert(PANEL_KEY.to_string(), Value::Null);
    ctx.include(PANEL_ID);
    Ok(())
}

fn open_session(ctx: &RenderContext, state: &ConnectionState) -> Result<PanelSession, PanelError> {
    let id = open_panel_id(state).ok_or(PanelError::NotOpen)?;
    ctx.store().panels().get(id).ok_or_else(|| PanelError::UnknownPanel(id.to_string()))
}

/// Button index from a `_panelBtn` payload.
///
/// `null`, `0`, `"0"`, `""` and `false` all mean no button was pressed, so
/// the first button can never be pressed through this path.
fn button_index(payload: &Value) -> Option<usize> {
    match payload {
        Value::Number(n) => n.as_u64().filter(|&i| i != 0).map(|i| i as usize),
        Value::String(s) if !s.is_empty() && s != "0" => s.trim().parse().ok().filter(|&i| i != 0),
        _ => None,
    }
}

/// Run a built-in panel action.
pub(crate) async fn run_builtin(
    action: PanelAction,
    ctx: &mut RenderContext,
    mut state: ConnectionState,
) -> HandlerResult {
    let module: Arc<dyn RouteModule> = Arc::clone(ctx.handlers().module());

    match action {
        PanelAction::Submit => {
            let session = open_session(ctx, &state)?;
            ctx.panel_state = Some(session.state.clone());
            ctx.payload = session.coerce(std::mem::take(&mut ctx.payload));

            close(ctx, &mut state)?;

            let name = session.submit_action.unwrap_or_default();
            let target = ctx.handlers().app_action(&name).ok_or(PanelError::UnknownAction(name))?;
            module.handle(target, ctx, state).await
        },
        PanelAction::Button => {
            let session = open_session(ctx, &state)?;
            ctx.panel_state = Some(session.state.clone());

            let index = button_index(&ctx.payload).ok_or(PanelError::MissingButtonIndex)?;
            let Some(action) = session.button_actions.get(index) else {
                return Err(PanelError::NoButtonAction(index).into());
            };

            close(ctx, &mut state)?;

            match action {
                Some(name) => {
                    let target = ctx
                        .handlers()
                        .app_action(name)
                        .ok_or_else(|| PanelError::UnknownAction(name.clone()))?;
                    module.handle(target, ctx, state).await
                },
                None => Ok(Some(ctx.render(state, Targets::None))),
            }
        },
        PanelAction::EasyClose => {
            let session = open_session(ctx, &state)?;
            if session.easy_close {
                close(ctx, &mut state)?;
            }
            Ok(Some(ctx.render(state, Targets::None)))
        },
        PanelAction::Validate => match module.schema() {
            Some(schema) => Ok(Some(validate_trigger(ctx, state, schema))),
            None => Ok(Some(state)),
        },
    }
}
