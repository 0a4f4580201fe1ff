//! Server error types.
//!
//! Each layer has its own enum so callers can tell a broken route file from a
//! failing handler or a dead socket. Configuration faults are logged and abort
//! only the operation that hit them; the process keeps serving other routes.

use syncframe_core::TemplateError;
use syncframe_proto::ProtocolError;
use thiserror::Error;

/// Errors reading route files.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The file does not exist under the routes root.
    #[error("template not found: {0}")]
    NotFound(String),

    /// The path escapes the routes root or is otherwise unusable.
    #[error("invalid template path: {0}")]
    InvalidPath(String),

    /// Underlying filesystem failure.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// Path relative to the routes root.
        path: String,
        /// The OS error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors turning a route file into a [`crate::CompiledRoute`].
#[derive(Error, Debug)]
pub enum CompileError {
    /// The route file could not be read.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The rendered markup is not a valid template.
    ///
    /// Fatal for the route: GET answers with the 500 page until restart.
    #[error("template error in {file}: {source}")]
    Template {
        /// Offending route or partial file.
        file: String,
        /// Parser diagnostic.
        #[source]
        source: TemplateError,
    },
}

/// Errors from the session store.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The backing store is unavailable.
    ///
    /// During dispatch this terminates the connection.
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Failure raised by a route handler.
///
/// Handler failures never reach the client as an error message; the
/// dispatcher logs them and answers with the route's 500 page.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The module declared the action but has no branch for it.
    #[error("action `{0}` is declared but not handled")]
    Unhandled(String),

    /// Application failure with a name and message for the error page.
    #[error("{name}: {message}")]
    Failed {
        /// Short error class shown as `error.name`.
        name: String,
        /// Human readable detail shown as `error.message`.
        message: String,
    },

    /// A panel operation failed inside the handler.
    #[error(transparent)]
    Panel(#[from] PanelError),
}

impl HandlerError {
    /// Generic failure with the name `Error`.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed { name: "Error".to_string(), message: message.into() }
    }

    /// Error class for the error page.
    pub fn name(&self) -> &str {
        match self {
            Self::Unhandled(_) => "UnhandledAction",
            Self::Failed { name, .. } => name,
            Self::Panel(_) => "PanelError",
        }
    }

    /// Message for the error page.
    pub fn message(&self) -> String {
        match self {
            Self::Failed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Panel protocol violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PanelError {
    /// Close, submit or button with no `panel.id` in connection state.
    #[error("there is no panel open")]
    NotOpen,

    /// `panel.id` does not match any registered panel.
    #[error("no panel registered under id {0}")]
    UnknownPanel(String),

    /// The button payload was missing or falsy.
    #[error("buttons without an index in their payload cannot be pressed")]
    MissingButtonIndex,

    /// The pressed index has no button or no action.
    #[error("button {0} has no action")]
    NoButtonAction(usize),

    /// An action named by the panel is not in the route's handler table.
    #[error("panel action `{0}` does not exist on this route")]
    UnknownAction(String),
}

/// Errors that end a connection's dispatch loop.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The session could not be reloaded before an action.
    #[error("session reload failed: {0}")]
    Session(#[from] SessionError),

    /// The route could not be compiled while rebinding.
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Errors in the HTTP/WebSocket runtime.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid configuration (bind address, routes directory).
    ///
    /// Prevents startup. Fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A client sent a malformed message.
    ///
    /// Fatal for that connection only.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A WebSocket claimed a mount token that was never issued or was
    /// already used.
    #[error("unknown mount token {0}")]
    UnknownMount(String),

    /// Route discovery failed at boot.
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
