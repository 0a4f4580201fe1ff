//! Per-socket connection task.
//!
//! Each connection owns its mounted state and processes inputs strictly in
//! arrival order: an action is fully dispatched (handler, session save,
//! outbound messages) before the next input is read. The transport talks to
//! the task through a [`Connection`] handle; dropping the handle's sender
//! ends the task.

use std::{collections::BTreeMap, fmt, sync::Arc};

use syncframe_proto::{ActionMessage, Hello, ServerMessage};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tracing::{debug, error};

use crate::{
    compiler::CompiledRoute,
    context::Env,
    dispatcher::dispatch,
    error::ServerError,
    registry::ConnectionInfo,
    state::ConnectionState,
    store::AppStore,
};

/// A rendered page waiting for, or bound to, a live connection.
#[derive(Clone)]
pub struct Mounted {
    /// Compiled route the page shows.
    pub route: Arc<CompiledRoute>,
    /// Current connection state.
    pub state: ConnectionState,
    /// Route parameters of the page request.
    pub params: BTreeMap<String, String>,
    /// Query string of the page request.
    pub query: BTreeMap<String, String>,
    /// Request environment.
    pub env: Env,
    /// Visitor session.
    pub session_id: String,
}

impl Mounted {
    /// Mounted page with an empty query and environment.
    pub fn new(
        route: Arc<CompiledRoute>,
        state: ConnectionState,
        params: BTreeMap<String, String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            route,
            state,
            params,
            query: BTreeMap::new(),
            env: Env::default(),
            session_id: session_id.into(),
        }
    }

    /// Endpoint of the mounted route.
    pub fn endpoint(&self) -> &str {
        self.route.endpoint()
    }
}

impl fmt::Debug for Mounted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mounted")
            .field("endpoint", &self.endpoint())
            .field("state", &self.state)
            .field("params", &self.params)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Input to a connection task.
#[derive(Debug)]
pub(crate) enum ConnectionInput {
    /// Client action.
    Action(ActionMessage),
    /// Morph navigation mounted a new route for this connection.
    Rebind(Box<Mounted>),
}

/// Sending half of a connection. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ActionSender {
    inbox: UnboundedSender<ConnectionInput>,
}

impl ActionSender {
    /// Queue an action. Fails once the connection has terminated.
    pub fn send(&self, action: ActionMessage) -> Result<(), ServerError> {
        self.inbox
            .send(ConnectionInput::Action(action))
            .map_err(|_| ServerError::Transport("connection closed".to_string()))
    }
}

/// Handle to a live connection.
#[derive(Debug)]
pub struct Connection {
    id: String,
    sender: ActionSender,
    outbound: UnboundedReceiver<ServerMessage>,
}

impl Connection {
    /// Connection id, also sent to the client in the greeting.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue an action.
    pub fn send(&self, action: ActionMessage) -> Result<(), ServerError> {
        self.sender.send(action)
    }

    /// Next outbound message. `None` once the connection has terminated.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.outbound.recv().await
    }

    /// Next outbound message if one is ready.
    pub fn try_recv(&mut self) -> Option<ServerMessage> {
        match self.outbound.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Split into the sending and receiving halves.
    pub fn into_parts(self) -> (ActionSender, UnboundedReceiver<ServerMessage>) {
        (self.sender, self.outbound)
    }
}

/// Register `mounted` as a new connection and start its task.
pub(crate) fn spawn(store: Arc<AppStore>, mounted: Mounted) -> Connection {
    let id = uuid::Uuid::new_v4().to_string();
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let info = ConnectionInfo::new(mounted.session_id.clone(), mounted.endpoint(), inbox_tx.downgrade());
    store.connections().register(&id, info);

    // The receiver is still held here, so the greeting cannot fail.
    let _ = outbound_tx.send(ServerMessage::Hello(Hello { connection_id: id.clone() }));

    tokio::spawn(run(Arc::clone(&store), id.clone(), mounted, inbox_rx, outbound_tx));

    Connection { id, sender: ActionSender { inbox: inbox_tx }, outbound: outbound_rx }
}

async fn run(
    store: Arc<AppStore>,
    id: String,
    mut mounted: Mounted,
    mut inbox: UnboundedReceiver<ConnectionInput>,
    outbound: UnboundedSender<ServerMessage>,
) {
    debug!("connection {id} opened on {}", mounted.endpoint());

    'inputs: while let Some(input) = inbox.recv().await {
        match input {
            ConnectionInput::Action(action) => match dispatch(&store, &mut mounted, action).await {
                Ok(messages) => {
                    for message in messages {
                        if outbound.send(message).is_err() {
                            debug!("connection {id}: client went away");
                            break 'inputs;
                        }
                    }
                },
                Err(e) => {
                    error!("connection {id} terminated: {e}");
                    break 'inputs;
                },
            },
            ConnectionInput::Rebind(next) => {
                store.connections().rebind(&id, next.endpoint());
                debug!("connection {id} rebound to {}", next.endpoint());
                mounted = *next;
            },
        }
    }

    store.connections().unregister(&id);
    debug!("connection {id} closed");
}
