//! Integration tests for panels and field validation.
//!
//! Covers the built-in panel actions end to end:
//! 1. Opening publishes `state.panel`, opens the container, renders `#panel`
//! 2. Submit coerces checkbox and numeric fields, closes, runs the submit action
//! 3. Buttons are addressed by index; falsy indexes are rejected
//! 4. Easy-close only closes panels opened with `easy_close`
//! 5. Field validation toggles `.invalid` and the submit button

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::json;
use syncframe_proto::{ActionMessage, Instructions, ServerMessage, Trigger};
use syncframe_server::{
    ActionId, App, Connection, ConnectionState, FieldSchema, HandlerError, HandlerResult, MemorySource,
    ModuleRegistry, PageRequest, RenderContext, RouteModule, StoreConfig, Targets,
    panel::{self, FieldKind, PanelButton, PanelField, PanelOptions},
};
use tokio::time::{sleep, timeout};

const NOTES: &str = r#"<script server>
module = "notes"
panel = true
</script>
<html><body>
<p id="saved"><%= $.saved.title %>|<%= $.saved.public %>|<%= $.saved.pages %></p>
<div id="panel-container"><div id="panel"><% if $.panel %><h2><%= $.panel.title %></h2><% end %></div></div>
<form s-submit="_panelSubmit">
<fieldset id="title-fs"><input id="title" name="title"></fieldset>
<button id="submit-btn">Save</button>
</form>
</body></html>"#;

const ERROR_PAGE: &str = "<html><body><h1><%= error.title %></h1><p><%= error.message %></p></body></html>";

struct TitleRequired;

impl FieldSchema for TitleRequired {
    fn validate_field(&self, name: &str, value: &str) -> Option<String> {
        (name == "title" && value.trim().is_empty()).then(|| "Title is required".to_string())
    }
}

struct Notes;

fn edit_options() -> PanelOptions {
    PanelOptions::new("Edit note")
        .field(PanelField::new("title", "Title", FieldKind::Text))
        .field(PanelField::new("public", "Public", FieldKind::Checkbox))
        .field(PanelField::new("pages", "Pages", FieldKind::Number))
        .button(PanelButton::plain("Unreachable"))
        .button(PanelButton::plain("Cancel"))
        .button(PanelButton::new("Delete", "remove"))
        .button(PanelButton::new("Explode", "explode"))
        .submit_action("save")
}

#[async_trait]
impl RouteModule for Notes {
    fn actions(&self) -> &'static [&'static str] {
        &["edit", "save", "remove", "bad", "explode", "forget", "peek", "peek_fail"]
    }

    fn schema(&self) -> Option<&dyn FieldSchema> {
        Some(&TitleRequired)
    }

    async fn handle(
        &self,
        action: ActionId,
        ctx: &mut RenderContext,
        mut state: ConnectionState,
    ) -> HandlerResult {
        match action.name {
            "edit" => {
                let submit = match ctx.payload.as_str() {
                    Some(name @ ("explode" | "forget")) => name.to_string(),
                    _ => "save".to_string(),
                };
                let mut options = edit_options().submit_action(submit);
                if ctx.payload == json!("easy") {
                    options = options.easy_close();
                }
                panel::open(ctx, &mut state, options)?;
                Ok(Some(ctx.render(state, Targets::None)))
            },
            "explode" => Err(HandlerError::msg("exploded")),
            "forget" => Ok(None),
            "peek" => {
                panel::open(ctx, &mut state, edit_options())?;
                Ok(None)
            },
            "peek_fail" => {
                panel::open(ctx, &mut state, edit_options())?;
                Err(HandlerError::msg("peek failed"))
            },
            "save" => {
                state.insert("saved".into(), ctx.payload.clone());
                Ok(Some(ctx.render(state, Targets::id("#saved"))))
            },
            "remove" => {
                state.insert("saved".into(), json!({"title": "deleted"}));
                Ok(Some(ctx.render(state, Targets::id("#saved"))))
            },
            "bad" => {
                panel::open(ctx, &mut state, PanelOptions::new("Broken").submit_action("missing"))?;
                Ok(Some(state))
            },
            _ => Err(HandlerError::Unhandled(action.name.to_string())),
        }
    }
}

async fn app() -> App {
    let source = MemorySource::new().with_file("notes.html", NOTES).with_file("_500.html", ERROR_PAGE);
    let modules = ModuleRegistry::new().register("notes", Notes);
    App::new(Arc::new(source), modules, StoreConfig::default()).await.unwrap()
}

async fn open(app: &App) -> Connection {
    let page = app.get(PageRequest::get("/notes")).await;
    assert_eq!(page.status, 200, "{}", page.body);
    let mut connection = app.connect(page.mount_token.as_deref().unwrap()).unwrap();
    assert!(matches!(connection.recv().await, Some(ServerMessage::Hello(_))));
    connection
}

async fn next_morph(connection: &mut Connection) -> Instructions {
    match timeout(Duration::from_secs(2), connection.recv()).await {
        Ok(Some(ServerMessage::Morph(instructions))) => instructions,
        other => panic!("Expected Morph, got {other:?}"),
    }
}

async fn send(connection: &mut Connection, message: ActionMessage) -> Instructions {
    connection.send(message).unwrap();
    next_morph(connection).await
}

fn action(name: &str) -> ActionMessage {
    ActionMessage::new(name)
}

fn classes<'a>(map: &'a std::collections::BTreeMap<String, Vec<String>>, id: &str) -> Vec<&'a str> {
    map.get(id).map(|v| v.iter().map(String::as_str).collect()).unwrap_or_default()
}

#[tokio::test]
async fn open_publishes_and_renders_the_panel() {
    let app = app().await;
    let mut connection = open(&app).await;

    let morph = send(&mut connection, action("edit")).await;

    assert_eq!(morph.elements_to_sync["#panel"], r#"<div id="panel"><h2>Edit note</h2></div>"#);
    assert_eq!(classes(&morph.css_classes_to_add, "#panel-container"), vec![".is-open"]);
    assert_eq!(app.store().panels().len(), 1);
}

#[tokio::test]
async fn submit_coerces_closes_and_runs_submit_action() {
    let app = app().await;
    let mut connection = open(&app).await;
    send(&mut connection, action("edit")).await;

    let morph =
        send(&mut connection, action("_panelSubmit").with_payload(json!({"title": "Hi", "pages": "3"}))).await;

    assert_eq!(morph.elements_to_sync["#saved"], r#"<p id="saved">Hi|false|3</p>"#);
    assert_eq!(morph.elements_to_sync["#panel"], r#"<div id="panel"></div>"#);
    assert_eq!(classes(&morph.css_classes_to_remove, "#panel-container"), vec![".is-open"]);
    assert!(app.store().panels().is_empty());
}

#[tokio::test]
async fn checked_checkbox_submits_true() {
    let app = app().await;
    let mut connection = open(&app).await;
    send(&mut connection, action("edit")).await;

    let payload = json!({"title": "Hi", "public": "on", "pages": "x"});
    let morph = send(&mut connection, action("_panelSubmit").with_payload(payload)).await;

    assert_eq!(morph.elements_to_sync["#saved"], r#"<p id="saved">Hi|true|</p>"#);
}

#[tokio::test]
async fn button_with_action_closes_and_runs_it() {
    let app = app().await;
    let mut connection = open(&app).await;
    send(&mut connection, action("edit")).await;

    let morph = send(&mut connection, action("_panelBtn").with_payload(json!(2))).await;

    assert_eq!(morph.elements_to_sync["#saved"], r#"<p id="saved">deleted||</p>"#);
    assert!(app.store().panels().is_empty());
}

#[tokio::test]
async fn button_without_action_only_closes() {
    let app = app().await;
    let mut connection = open(&app).await;
    send(&mut connection, action("edit")).await;

    let morph = send(&mut connection, action("_panelBtn").with_payload(json!("1"))).await;

    assert_eq!(morph.elements_to_sync.keys().collect::<Vec<_>>(), vec!["#panel"]);
    assert!(app.store().panels().is_empty());
}

#[tokio::test]
async fn falsy_button_index_is_an_error() {
    let app = app().await;
    let mut connection = open(&app).await;
    send(&mut connection, action("edit")).await;

    let morph = send(&mut connection, action("_panelBtn").with_payload(json!(0))).await;

    let html = morph.document_html().expect("500 page");
    assert!(html.contains("buttons without an index"), "{html}");
    assert_eq!(app.store().panels().len(), 1, "panel stays open");
}

#[tokio::test]
async fn easy_close_respects_the_option() {
    let app = app().await;
    let mut connection = open(&app).await;

    send(&mut connection, action("edit")).await;
    let morph = send(&mut connection, action("_panelEasyClose")).await;
    assert!(morph.is_empty());
    assert_eq!(app.store().panels().len(), 1);

    send(&mut connection, action("edit").with_payload(json!("easy"))).await;
    let morph = send(&mut connection, action("_panelEasyClose")).await;
    assert!(morph.elements_to_sync.contains_key("#panel"));
    assert!(app.store().panels().is_empty());
}

#[tokio::test]
async fn reopening_replaces_the_open_panel() {
    let app = app().await;
    let mut connection = open(&app).await;

    send(&mut connection, action("edit")).await;
    send(&mut connection, action("edit")).await;

    assert_eq!(app.store().panels().len(), 1);
}

#[tokio::test]
async fn unknown_action_leaves_open_panel_untouched() {
    let app = app().await;
    let mut connection = open(&app).await;
    send(&mut connection, action("edit")).await;

    connection.send(action("_panelExplode")).unwrap();
    sleep(Duration::from_millis(20)).await;

    assert!(connection.try_recv().is_none());
    assert_eq!(app.store().panels().len(), 1);

    let morph = send(&mut connection, action("_panelSubmit").with_payload(json!({"title": "ok"}))).await;
    assert_eq!(morph.elements_to_sync["#saved"], r#"<p id="saved">ok|false|</p>"#);
}

#[tokio::test]
async fn submit_without_open_panel_is_an_error() {
    let app = app().await;
    let mut connection = open(&app).await;

    let morph = send(&mut connection, action("_panelSubmit").with_payload(json!({}))).await;

    let html = morph.document_html().expect("500 page");
    assert!(html.contains("there is no panel open"), "{html}");
}

#[tokio::test]
async fn open_with_unknown_submit_action_fails() {
    let app = app().await;
    let mut connection = open(&app).await;

    let morph = send(&mut connection, action("bad")).await;

    assert!(morph.document_html().is_some_and(|html| html.contains("missing")));
    assert!(app.store().panels().is_empty());
}

#[tokio::test]
async fn validation_toggles_fieldset_and_submit_button() {
    let app = app().await;
    let mut connection = open(&app).await;
    let trigger = |value: &str| Trigger { id: "title".into(), name: "title".into(), value: value.into() };

    let morph = send(&mut connection, action("_panelValidate").with_trigger(trigger(""))).await;
    assert!(morph.elements_to_sync.contains_key("#title-fs"));
    assert_eq!(classes(&morph.css_classes_to_add, "#title-fs"), vec![".invalid"]);
    assert_eq!(morph.attributes_to_set["#submit-btn"]["disabled"], "");

    // Same message again: nothing to send.
    connection.send(action("_panelValidate").with_trigger(trigger(" "))).unwrap();
    sleep(Duration::from_millis(20)).await;
    assert!(connection.try_recv().is_none());

    let morph = send(&mut connection, action("_panelValidate").with_trigger(trigger("Hello"))).await;
    assert_eq!(classes(&morph.css_classes_to_remove, "#title-fs"), vec![".invalid"]);
    assert_eq!(morph.attributes_to_remove["#submit-btn"], vec!["disabled".to_string()]);
}

/// Close the open panel through its plain button; fails the test if the
/// registry lost track of it.
async fn cancel(connection: &mut Connection) {
    let morph = send(connection, action("_panelBtn").with_payload(json!(1))).await;
    assert!(morph.document_html().is_none(), "panel closes cleanly: {morph:?}");
    assert_eq!(morph.elements_to_sync["#panel"], r#"<div id="panel"></div>"#);
}

#[tokio::test]
async fn failed_submit_action_keeps_the_panel_registered() {
    let app = app().await;
    let mut connection = open(&app).await;
    send(&mut connection, action("edit").with_payload(json!("explode"))).await;

    let morph = send(&mut connection, action("_panelSubmit").with_payload(json!({"title": "Hi"}))).await;

    let html = morph.document_html().expect("500 page");
    assert!(html.contains("exploded"), "{html}");
    assert_eq!(app.store().panels().len(), 1);

    cancel(&mut connection).await;
    assert!(app.store().panels().is_empty());
}

#[tokio::test]
async fn submit_action_without_state_keeps_the_panel_registered() {
    let app = app().await;
    let mut connection = open(&app).await;
    send(&mut connection, action("edit").with_payload(json!("forget"))).await;

    connection.send(action("_panelSubmit").with_payload(json!({"title": "Hi"}))).unwrap();
    let morph = send(&mut connection, action("_panelEasyClose")).await;

    assert!(morph.is_empty(), "panel is still open and not easy-close: {morph:?}");
    assert_eq!(app.store().panels().len(), 1);
    cancel(&mut connection).await;
}

#[tokio::test]
async fn failed_button_action_keeps_the_panel_registered() {
    let app = app().await;
    let mut connection = open(&app).await;
    send(&mut connection, action("edit")).await;

    let morph = send(&mut connection, action("_panelBtn").with_payload(json!(3))).await;

    assert!(morph.document_html().is_some_and(|html| html.contains("exploded")));
    assert_eq!(app.store().panels().len(), 1);
    cancel(&mut connection).await;
}

#[tokio::test]
async fn open_without_returned_state_leaves_no_registry_entry() {
    let app = app().await;
    let mut connection = open(&app).await;

    for _ in 0..3 {
        connection.send(action("peek")).unwrap();
    }
    send(&mut connection, action("edit")).await;

    assert_eq!(app.store().panels().len(), 1, "only the panel from `edit` remains");
}

#[tokio::test]
async fn failed_open_leaves_no_registry_entry() {
    let app = app().await;
    let mut connection = open(&app).await;

    let morph = send(&mut connection, action("peek_fail")).await;

    assert!(morph.document_html().is_some());
    assert!(app.store().panels().is_empty());
}

#[tokio::test]
async fn failed_reopen_restores_the_replaced_panel() {
    let app = app().await;
    let mut connection = open(&app).await;
    send(&mut connection, action("edit")).await;

    let morph = send(&mut connection, action("peek_fail")).await;

    assert!(morph.document_html().is_some());
    assert_eq!(app.store().panels().len(), 1);
    cancel(&mut connection).await;
    assert!(app.store().panels().is_empty());
}
