//! Action dispatch for one connection.
//!
//! One call handles one client action end to end:
//!
//! 1. reload the session (other tabs may have changed it)
//! 2. resolve the action name against the route's handler table
//! 3. run the handler on a copy of the connection state
//! 4. commit the returned state, or revert state and panel registry changes
//!    and render the 500 page
//! 5. persist the session if a successful handler touched it
//!
//! The emitted messages are returned to the connection task, which sends them
//! in order before reading the next action.

use std::sync::Arc;

use syncframe_proto::{ActionMessage, ServerMessage};
use tracing::{debug, error, warn};

use crate::{
    connection::Mounted,
    context::{Mode, RenderContext, RequestData},
    error::DispatchError,
    module::Action,
    panel::{self, run_builtin},
    store::AppStore,
};

/// Dispatch `message` against `mounted`, updating its state.
///
/// Errors are fatal to the connection. Handler failures are not errors here:
/// they render the route's 500 page.
pub(crate) async fn dispatch(
    store: &Arc<AppStore>,
    mounted: &mut Mounted,
    message: ActionMessage,
) -> Result<Vec<ServerMessage>, DispatchError> {
    let session = store.sessions().load(&mounted.session_id).await?;

    let name = message.action_name;
    let Some(action) = mounted.route.handlers().resolve(&name) else {
        error!("action `{name}` is not available on {}", mounted.endpoint());
        return Ok(Vec::new());
    };

    let request = RequestData {
        trigger: message.trigger,
        payload: message.payload,
        params: mounted.params.clone(),
        query: mounted.query.clone(),
        env: mounted.env.clone(),
    };
    let mut ctx = RenderContext::new(
        Mode::Action { name: name.clone() },
        Arc::clone(&mounted.route),
        Arc::clone(store),
        request,
        session,
    );

    let state = mounted.state.clone();
    let result = match action {
        Action::App(id) => {
            let module = Arc::clone(mounted.route.handlers().module());
            module.handle(id, &mut ctx, state).await
        },
        Action::Panel(builtin) => run_builtin(builtin, &mut ctx, state).await,
    };

    let failed = match result {
        Ok(Some(next)) => {
            mounted.state = next;
            false
        },
        Ok(None) => {
            warn!("action `{name}` returned no state; keeping the previous one");
            panel::rollback(&mut ctx);
            false
        },
        Err(e) => {
            error!("action `{name}` failed: {e}");
            panel::rollback(&mut ctx);
            ctx.discard_emissions();
            let state = mounted.state.clone();
            ctx.server_error(state, &e).await;
            true
        },
    };

    if failed {
        debug!("action `{name}` failed; session {} left unsaved", ctx.session.id());
    } else if ctx.session.is_dirty() {
        if let Err(e) = store.sessions().save(&ctx.session).await {
            error!("unable to save session {}: {e}", ctx.session.id());
        }
    }

    Ok(ctx.take_messages())
}
