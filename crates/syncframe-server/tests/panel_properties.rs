//! Property tests for the panel registry.
//!
//! Random open/close sequences on one connection must keep the registry in
//! step with the connection state:
//! - every opened panel gets an id never seen before
//! - at most one panel is registered per connection
//! - after a close the id is gone from the registry
//! - an open whose handler fails or returns no state leaves the registry as
//!   it was

use std::{collections::HashSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use proptest::prelude::*;
use syncframe_proto::{ActionMessage, ServerMessage};
use syncframe_server::{
    ActionId, App, ConnectionState, HandlerError, HandlerResult, MemorySource, ModuleRegistry,
    PageRequest, RenderContext, RouteModule, StoreConfig, Targets,
    panel::{self, PanelOptions},
};
use tokio::time::timeout;

const PAGE: &str = r#"<script server>
module = "page"
panel = true
</script>
<html><body><div id="panel-container"><div id="panel"><% if $.panel %><%= $.panel.id %><% end %></div></div></body></html>"#;

struct Page;

#[async_trait]
impl RouteModule for Page {
    fn actions(&self) -> &'static [&'static str] {
        &["open", "open_fail", "open_forget", "ping"]
    }

    async fn handle(
        &self,
        action: ActionId,
        ctx: &mut RenderContext,
        mut state: ConnectionState,
    ) -> HandlerResult {
        match action.name {
            "open" => {
                panel::open(ctx, &mut state, PanelOptions::new("p").easy_close())?;
                Ok(Some(ctx.render(state, Targets::None)))
            },
            "open_fail" => {
                panel::open(ctx, &mut state, PanelOptions::new("p").easy_close())?;
                Err(HandlerError::msg("open failed"))
            },
            "open_forget" => {
                panel::open(ctx, &mut state, PanelOptions::new("p").easy_close())?;
                Ok(None)
            },
            "ping" => Ok(Some(ctx.render(state, Targets::None))),
            _ => Err(HandlerError::Unhandled(action.name.to_string())),
        }
    }
}

/// Rendered `#panel` content: the open panel id, or empty when closed.
fn panel_id(message: Option<ServerMessage>) -> String {
    let instructions = match message {
        Some(ServerMessage::Morph(instructions)) => instructions,
        other => panic!("Expected Morph, got {other:?}"),
    };
    let html = instructions.elements_to_sync.get("#panel").cloned().unwrap_or_default();
    html.trim_start_matches(r#"<div id="panel">"#).trim_end_matches("</div>").to_string()
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Open,
    EasyClose,
    OpenFail,
    OpenForget,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Open),
        2 => Just(Op::EasyClose),
        1 => Just(Op::OpenFail),
        1 => Just(Op::OpenForget),
    ]
}

fn run(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    runtime.block_on(async move {
        let source = MemorySource::new().with_file("page.html", PAGE);
        let modules = ModuleRegistry::new().register("page", Page);
        let app = App::new(Arc::new(source), modules, StoreConfig::default()).await.unwrap();

        let page = app.get(PageRequest::get("/page")).await;
        let mut connection = app.connect(page.mount_token.as_deref().unwrap()).unwrap();
        connection.recv().await;

        let mut seen = HashSet::new();
        let mut open: Option<String> = None;

        for op in ops {
            match op {
                Op::Open => {
                    connection.send(ActionMessage::new("open")).unwrap();
                    let message = timeout(Duration::from_secs(2), connection.recv()).await.unwrap();
                    let id = panel_id(message);
                    prop_assert!(!id.is_empty());
                    prop_assert!(seen.insert(id.clone()), "panel id {} reused", id);
                    open = Some(id);
                },
                Op::EasyClose => {
                    connection.send(ActionMessage::new("_panelEasyClose")).unwrap();
                    let message = timeout(Duration::from_secs(2), connection.recv()).await.unwrap();
                    if open.take().is_some() {
                        prop_assert!(panel_id(message).is_empty());
                    } else {
                        // Easy-close with nothing open is a panel error: 500 page.
                        let Some(ServerMessage::Morph(instructions)) = message else {
                            panic!("Expected Morph");
                        };
                        prop_assert!(instructions.document_html().is_some());
                    }
                },
                Op::OpenFail => {
                    connection.send(ActionMessage::new("open_fail")).unwrap();
                    let message = timeout(Duration::from_secs(2), connection.recv()).await.unwrap();
                    let Some(ServerMessage::Morph(instructions)) = message else {
                        panic!("Expected Morph");
                    };
                    prop_assert!(instructions.document_html().is_some());
                },
                Op::OpenForget => {
                    // No output of its own; the ping marks when it has run.
                    connection.send(ActionMessage::new("open_forget")).unwrap();
                    connection.send(ActionMessage::new("ping")).unwrap();
                    timeout(Duration::from_secs(2), connection.recv()).await.unwrap();
                },
            }

            match &open {
                Some(id) => {
                    prop_assert!(app.store().panels().contains(id));
                    prop_assert_eq!(app.store().panels().len(), 1);
                },
                None => prop_assert!(app.store().panels().is_empty()),
            }
        }
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Panel ids are fresh and the registry tracks exactly the open panel.
    ///
    /// ORACLE: a connection holds at most one panel id; that id is registered
    /// while open and removed on close, and a failed or stateless open leaves
    /// both untouched.
    #[test]
    fn registry_tracks_the_open_panel(ops in prop::collection::vec(op(), 1..16)) {
        run(ops)?;
    }
}
