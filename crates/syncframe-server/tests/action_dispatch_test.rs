//! Integration tests for the action cycle.
//!
//! Each test loads a page through `App::get`, claims its mount token like the
//! browser's socket would, and drives actions through the live connection:
//! 1. The first outbound message is the greeting with the connection id
//! 2. Actions of one connection are handled strictly in arrival order
//! 3. Handler failures become the route's 500 page and revert state
//! 4. Unknown actions produce no output and leave state alone

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{Value, json};
use syncframe_proto::{ActionMessage, Instructions, ServerMessage};
use syncframe_server::{
    ActionId, App, Connection, ConnectionState, HandlerError, HandlerResult, MemorySource,
    ModuleRegistry, PageRequest, RenderContext, RouteModule, StoreConfig, Targets,
};
use tokio::time::{sleep, timeout};

const COUNTER: &str = r#"<script server>
module = "counter"
</script>
<html><body>
<p id="count"><%= $.count %></p>
<p id="log"><%= $.log %></p>
<p id="notice"><%= flash.notice %></p>
<p id="user"><%= $.user %></p>
</body></html>"#;

const ERROR_PAGE: &str =
    "<html><body><h1><%= error.title %></h1><p><%= error.message %></p></body></html>";

struct Counter;

fn push_log(state: &mut ConnectionState, entry: &str) {
    let log = state.entry("log").or_insert_with(|| json!([]));
    if let Value::Array(items) = log {
        items.push(json!(entry));
    }
}

#[async_trait]
impl RouteModule for Counter {
    fn actions(&self) -> &'static [&'static str] {
        &["increment", "slow", "fast", "fail", "forget", "leave", "notify", "remember", "remember_then_fail"]
    }

    async fn mount(&self, ctx: &mut RenderContext, mut state: ConnectionState) -> HandlerResult {
        state.insert("count".into(), json!(0));
        state.insert("log".into(), json!([]));
        if let Some(user) = ctx.session.get("user") {
            state.insert("user".into(), user.clone());
        }
        Ok(Some(ctx.render(state, Targets::Document)))
    }

    async fn handle(
        &self,
        action: ActionId,
        ctx: &mut RenderContext,
        mut state: ConnectionState,
    ) -> HandlerResult {
        match action.name {
            "increment" => {
                let count = state.get("count").and_then(Value::as_i64).unwrap_or(0);
                state.insert("count".into(), json!(count + 1));
                Ok(Some(ctx.render(state, Targets::id("#count"))))
            },
            "slow" => {
                sleep(Duration::from_millis(40)).await;
                push_log(&mut state, "slow");
                Ok(Some(ctx.render(state, Targets::id("#log"))))
            },
            "fast" => {
                push_log(&mut state, "fast");
                Ok(Some(ctx.render(state, Targets::id("#log"))))
            },
            "fail" => {
                state.insert("count".into(), json!(99));
                ctx.render(state, Targets::id("#count"));
                Err(HandlerError::msg("boom"))
            },
            "forget" => {
                state.insert("count".into(), json!(42));
                Ok(None)
            },
            "leave" => Ok(Some(ctx.redirect(state, "/elsewhere"))),
            "notify" => {
                ctx.flash("notice", "saved");
                Ok(Some(ctx.render(state, Targets::id("#notice"))))
            },
            "remember" => {
                ctx.session.set("user", json!("ada"));
                Ok(Some(state))
            },
            "remember_then_fail" => {
                ctx.session.set("user", json!("mallory"));
                ctx.flash("notice", "lost");
                Err(HandlerError::msg("boom"))
            },
            _ => Err(HandlerError::Unhandled(action.name.to_string())),
        }
    }
}

async fn app() -> App {
    let source = MemorySource::new()
        .with_file("counter.html", COUNTER)
        .with_file("plain.html", "<html><body><p id=\"plain\">plain</p></body></html>")
        .with_file("_500.html", ERROR_PAGE);
    let modules = ModuleRegistry::new().register("counter", Counter);
    App::new(Arc::new(source), modules, StoreConfig::default()).await.unwrap()
}

/// Load `path` and open its socket, consuming the greeting.
async fn open(app: &App, request: PageRequest) -> Connection {
    let page = app.get(request).await;
    assert_eq!(page.status, 200, "{}", page.body);

    let token = page.mount_token.expect("fresh GET stamps a mount token");
    let mut connection = app.connect(&token).unwrap();

    match connection.recv().await {
        Some(ServerMessage::Hello(hello)) => assert_eq!(hello.connection_id, connection.id()),
        other => panic!("Expected Hello, got {other:?}"),
    }
    connection
}

async fn next(connection: &mut Connection) -> ServerMessage {
    timeout(Duration::from_secs(2), connection.recv())
        .await
        .expect("message within timeout")
        .expect("connection open")
}

async fn next_morph(connection: &mut Connection) -> Instructions {
    match next(connection).await {
        ServerMessage::Morph(instructions) => instructions,
        other => panic!("Expected Morph, got {other:?}"),
    }
}

fn fragment<'a>(instructions: &'a Instructions, id: &str) -> &'a str {
    instructions.elements_to_sync.get(id).map_or("", String::as_str)
}

#[tokio::test]
async fn action_renders_only_the_requested_fragment() {
    let app = app().await;
    let mut connection = open(&app, PageRequest::get("/counter")).await;

    connection.send(ActionMessage::new("increment")).unwrap();
    let morph = next_morph(&mut connection).await;

    assert_eq!(morph.elements_to_sync.len(), 1);
    assert_eq!(fragment(&morph, "#count"), r#"<p id="count">1</p>"#);
}

#[tokio::test]
async fn actions_apply_in_arrival_order() {
    let app = app().await;
    let mut connection = open(&app, PageRequest::get("/counter")).await;

    connection.send(ActionMessage::new("slow")).unwrap();
    connection.send(ActionMessage::new("fast")).unwrap();

    assert_eq!(fragment(&next_morph(&mut connection).await, "#log"), r#"<p id="log">slow</p>"#);
    assert_eq!(fragment(&next_morph(&mut connection).await, "#log"), r#"<p id="log">slow,fast</p>"#);
}

#[tokio::test]
async fn connections_do_not_wait_for_each_other() {
    let app = app().await;
    let mut busy = open(&app, PageRequest::get("/counter")).await;
    let mut idle = open(&app, PageRequest::get("/counter")).await;

    busy.send(ActionMessage::new("slow")).unwrap();
    idle.send(ActionMessage::new("fast")).unwrap();

    let idle_morph = next_morph(&mut idle).await;
    assert_eq!(fragment(&idle_morph, "#log"), r#"<p id="log">fast</p>"#);
    assert!(busy.try_recv().is_none(), "slow action should still be running");

    assert_eq!(fragment(&next_morph(&mut busy).await, "#log"), r#"<p id="log">slow</p>"#);
}

#[tokio::test]
async fn unknown_action_sends_nothing() {
    let app = app().await;
    let mut connection = open(&app, PageRequest::get("/counter")).await;

    connection.send(ActionMessage::new("explode")).unwrap();
    connection.send(ActionMessage::new("increment")).unwrap();

    // The first reply belongs to `increment`, and state was not touched.
    let morph = next_morph(&mut connection).await;
    assert_eq!(fragment(&morph, "#count"), r#"<p id="count">1</p>"#);
}

#[tokio::test]
async fn handler_error_renders_500_and_reverts_state() {
    let app = app().await;
    let mut connection = open(&app, PageRequest::get("/counter")).await;

    connection.send(ActionMessage::new("fail")).unwrap();
    let morph = next_morph(&mut connection).await;

    let html = morph.document_html().expect("full document replacement");
    assert!(html.contains("<h1>Internal Server Error</h1>"), "{html}");
    assert!(html.contains("<p>boom</p>"), "{html}");
    assert!(!morph.elements_to_sync.contains_key("#count"), "earlier render is discarded");

    connection.send(ActionMessage::new("increment")).unwrap();
    let morph = next_morph(&mut connection).await;
    assert_eq!(fragment(&morph, "#count"), r#"<p id="count">1</p>"#);
}

#[tokio::test]
async fn missing_state_keeps_the_previous_one() {
    let app = app().await;
    let mut connection = open(&app, PageRequest::get("/counter")).await;

    connection.send(ActionMessage::new("forget")).unwrap();
    connection.send(ActionMessage::new("increment")).unwrap();

    let morph = next_morph(&mut connection).await;
    assert_eq!(fragment(&morph, "#count"), r#"<p id="count">1</p>"#);
}

#[tokio::test]
async fn redirect_is_sent_as_message() {
    let app = app().await;
    let mut connection = open(&app, PageRequest::get("/counter")).await;

    connection.send(ActionMessage::new("leave")).unwrap();

    assert_eq!(next(&mut connection).await, ServerMessage::Redirect("/elsewhere".to_string()));
}

#[tokio::test]
async fn flash_is_shown_once() {
    let app = app().await;
    let mut connection = open(&app, PageRequest::get("/counter")).await;

    connection.send(ActionMessage::new("notify")).unwrap();
    let morph = next_morph(&mut connection).await;
    assert_eq!(fragment(&morph, "#notice"), r#"<p id="notice">saved</p>"#);

    // The render that showed the message drained it.
    let page = app.get(PageRequest::get("/counter").with_session(session_of(&app, &connection))).await;
    assert!(page.body.contains(r#"<p id="notice"></p>"#), "{}", page.body);
}

#[tokio::test]
async fn failed_handler_does_not_save_the_session() {
    let app = app().await;
    let mut connection = open(&app, PageRequest::get("/counter")).await;

    connection.send(ActionMessage::new("remember_then_fail")).unwrap();
    let morph = next_morph(&mut connection).await;
    assert!(morph.document_html().is_some(), "500 page");

    let page = app.get(PageRequest::get("/counter").with_session(session_of(&app, &connection))).await;
    assert!(page.body.contains(r#"<p id="user"></p>"#), "{}", page.body);
    assert!(page.body.contains(r#"<p id="notice"></p>"#), "{}", page.body);
}

#[tokio::test]
async fn session_changes_survive_into_the_next_page_load() {
    let app = app().await;
    let first = app.get(PageRequest::get("/counter")).await;
    let cookie = first.set_cookie.clone().unwrap();
    let session = cookie.trim_start_matches("session_id=").split(';').next().unwrap().to_string();

    let mut connection = app.connect(first.mount_token.as_deref().unwrap()).unwrap();
    next(&mut connection).await;
    connection.send(ActionMessage::new("remember")).unwrap();
    // `remember` emits nothing; a follow-up action marks the first as done.
    connection.send(ActionMessage::new("increment")).unwrap();
    next_morph(&mut connection).await;

    let page = app.get(PageRequest::get("/counter").with_session(session)).await;
    assert!(page.body.contains(r#"<p id="user">ada</p>"#), "{}", page.body);
}

#[tokio::test]
async fn closed_handle_ends_the_connection() {
    let app = app().await;
    let connection = open(&app, PageRequest::get("/counter")).await;
    assert_eq!(app.store().connections().len(), 1);

    drop(connection);

    timeout(Duration::from_secs(2), async {
        while !app.store().connections().is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("connection unregistered");
}

#[tokio::test]
async fn broken_server_block_disables_actions_only() {
    let source = MemorySource::new().with_file("broken.html", "<script server>\nmodule = [\n</script><p id=\"x\">ok</p>");
    let app = App::new(Arc::new(source), ModuleRegistry::new(), StoreConfig::default()).await.unwrap();

    let mut connection = open(&app, PageRequest::get("/broken")).await;
    connection.send(ActionMessage::new("anything")).unwrap();

    sleep(Duration::from_millis(20)).await;
    assert!(connection.try_recv().is_none());
}

#[tokio::test]
async fn morph_navigation_rebinds_the_connection() {
    let app = app().await;
    let mut connection = open(&app, PageRequest::get("/counter")).await;
    let session = session_of(&app, &connection);

    let page = app
        .get(PageRequest::get("/plain").with_session(session).morph(Some(connection.id().to_string())))
        .await;
    assert_eq!(page.status, 200);
    assert_eq!(page.mount_token, None);

    // Queued behind the rebind, so it runs against the plain route.
    connection.send(ActionMessage::new("increment")).unwrap();
    sleep(Duration::from_millis(20)).await;

    assert!(connection.try_recv().is_none());
    let endpoint = app.store().connections().info(connection.id()).map(|info| info.endpoint.clone());
    assert_eq!(endpoint.as_deref(), Some("/plain"));
}

#[tokio::test]
async fn morph_from_another_session_does_not_rebind() {
    let app = app().await;
    let connection = open(&app, PageRequest::get("/counter")).await;

    let page = app
        .get(PageRequest::get("/plain").with_session("intruder").morph(Some(connection.id().to_string())))
        .await;
    assert_eq!(page.status, 200);
    sleep(Duration::from_millis(20)).await;

    let endpoint = app.store().connections().info(connection.id()).map(|info| info.endpoint.clone());
    assert_eq!(endpoint.as_deref(), Some("/counter"));
}

fn session_of(app: &App, connection: &Connection) -> String {
    app.store()
        .connections()
        .info(connection.id())
        .map(|info| info.session_id.clone())
        .expect("registered connection")
}
