//! Syncframe server.
//!
//! Server-driven reactive pages: route files are compiled once into a DOM
//! tree plus a handler table, rendered on GET, and kept live over a
//! WebSocket that carries client actions in and instruction sets out.
//!
//! # Architecture
//!
//! Route behavior lives in [`RouteModule`]s registered at boot. Everything
//! shared between requests (compiled routes, open panels, pending mounts,
//! live connections, sessions) lives in one [`AppStore`] passed by `Arc`.
//! Each live connection is a task that handles its actions one at a time.
//!
//! # Components
//!
//! - [`App`]: page GETs and connection setup, transport independent
//! - [`Server`]: hyper HTTP/1 runtime with the WebSocket upgrade
//! - [`RenderContext`]: what handlers use to render, redirect and mutate
//! - [`panel`]: modal panels built on the action protocol
//! - [`compile`]: route files to [`CompiledRoute`]s

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod app;
mod cache;
mod compiler;
mod connection;
mod context;
mod dispatcher;
mod error;
mod http;
mod instructions;
mod module;
pub mod panel;
mod registry;
mod routes;
pub mod session;
mod source;
mod state;
mod store;
mod transport;
mod validate;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

pub use app::{App, PageRequest, PageResponse};
pub use cache::RouteCache;
pub use compiler::{CompiledRoute, MAX_PARTIAL_DEPTH, compile, compile_error_page};
pub use connection::{ActionSender, Connection, Mounted};
pub use context::{Env, RenderContext, Targets};
pub use error::{
    CompileError, DispatchError, HandlerError, PanelError, ServerError, SessionError, SourceError,
};
use hyper::{server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
pub use module::{
    Action, ActionId, HandlerResult, HandlerTable, ModuleRegistry, PanelAction, RouteModule,
    StaticModule,
};
pub use registry::{ConnectionInfo, ConnectionRegistry};
pub use routes::{RouteEntry, RouteMatch, RoutePattern, RouteTable};
pub use source::{DiskSource, MemorySource, TemplateSource};
pub use state::{ConnectionState, FORM_ERRORS_KEY, PANEL_KEY};
pub use store::{AppStore, StoreConfig};
use tokio::net::TcpListener;
pub use validate::{FieldSchema, SUBMIT_BUTTON_ID};

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "127.0.0.1:3000")
    pub bind_address: String,
    /// Directory holding the route files
    pub routes_dir: PathBuf,
    /// Store limits
    pub store: StoreConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            routes_dir: PathBuf::from("routes"),
            store: StoreConfig::default(),
        }
    }
}

/// Production syncframe server.
pub struct Server {
    app: App,
    listener: TcpListener,
}

impl Server {
    /// Load routes and bind the listener.
    pub async fn bind(config: ServerRuntimeConfig, modules: ModuleRegistry) -> Result<Self, ServerError> {
        let source = DiskSource::new(&config.routes_dir);
        let app = App::new(Arc::new(source), modules, config.store).await?;
        let listener = TcpListener::bind(&config.bind_address)
            .await
            .map_err(|e| ServerError::Config(format!("cannot bind {}: {e}", config.bind_address)))?;

        tracing::info!("{} routes loaded from {}", app.store().routes().len(), config.routes_dir.display());
        Ok(Self { app, listener })
    }

    /// The application served.
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the process exits.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.local_addr()?);

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                    continue;
                },
            };
            let app = self.app.clone();

            tokio::spawn(async move {
                let service = service_fn(move |request| http::handle(app.clone(), request, peer));
                let io = TokioIo::new(stream);
                if let Err(e) = http1::Builder::new().serve_connection(io, service).with_upgrades().await {
                    tracing::debug!("Connection error from {}: {}", peer, e);
                }
            });
        }
    }
}
