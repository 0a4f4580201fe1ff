//! Page requests and connection setup.
//!
//! [`App`] is the transport-independent face of the server. The HTTP layer
//! turns a GET into a [`PageRequest`] and writes back the [`PageResponse`];
//! the WebSocket layer claims the pending mount with [`App::connect`]. Tests
//! and the loopback harness drive the same two calls directly.

use std::{collections::BTreeMap, sync::Arc};

use serde_json::{Value, json};
use syncframe_core::dom::stamp_root_attribute;
use syncframe_proto::names::{MOUNT_ATTRIBUTE, SESSION_COOKIE};
use tracing::{error, info, warn};

use crate::{
    connection::{self, Connection, ConnectionInput, Mounted},
    context::{Emission, Env, Mode, RenderContext, RequestData, not_found_value, parent_dir},
    error::ServerError,
    module::ModuleRegistry,
    panel,
    session::{MemorySessionStore, Session, SessionStore},
    source::TemplateSource,
    state::ConnectionState,
    store::{AppStore, StoreConfig},
};

/// An HTTP GET of a route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Request path.
    pub path: String,
    /// Decoded query parameters.
    pub query: BTreeMap<String, String>,
    /// Host name from the `Host` header.
    pub hostname: String,
    /// Peer address.
    pub ip: String,
    /// Value of the session cookie, if sent.
    pub session_id: Option<String>,
    /// `true` for morph navigation fetches.
    pub morph: bool,
    /// Live connection to rebind (`socket-id` header).
    pub connection_id: Option<String>,
}

impl PageRequest {
    /// Plain GET of `path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Self::default() }
    }

    /// Send the session cookie.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Mark as a morph fetch from connection `connection_id`.
    #[must_use]
    pub fn morph(mut self, connection_id: Option<String>) -> Self {
        self.morph = true;
        self.connection_id = connection_id;
        self
    }
}

/// Response to a [`PageRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageResponse {
    /// HTTP status.
    pub status: u16,
    /// Document markup. Empty for redirects.
    pub body: String,
    /// `Location` of a plain redirect.
    pub location: Option<String>,
    /// `s-redirect` target of a morph redirect.
    pub morph_redirect: Option<String>,
    /// `Set-Cookie` value for a newly created session.
    pub set_cookie: Option<String>,
    /// Token the client passes when opening its socket.
    pub mount_token: Option<String>,
}

/// The application: routes, modules and shared state.
#[derive(Debug, Clone)]
pub struct App {
    store: Arc<AppStore>,
}

impl App {
    /// Load routes from `source` with an in-memory session store.
    pub async fn new(
        source: Arc<dyn TemplateSource>,
        modules: ModuleRegistry,
        config: StoreConfig,
    ) -> Result<Self, ServerError> {
        Self::with_session_store(source, modules, Arc::new(MemorySessionStore::new()), config).await
    }

    /// Load routes from `source` with a custom session store.
    pub async fn with_session_store(
        source: Arc<dyn TemplateSource>,
        modules: ModuleRegistry,
        sessions: Arc<dyn SessionStore>,
        config: StoreConfig,
    ) -> Result<Self, ServerError> {
        let store = AppStore::load(source, modules, sessions, config).await?;
        Ok(Self { store: Arc::new(store) })
    }

    /// Shared state.
    pub fn store(&self) -> &Arc<AppStore> {
        &self.store
    }

    /// Serve a page.
    pub async fn get(&self, request: PageRequest) -> PageResponse {
        let (session, set_cookie) = self.open_session(request.session_id.as_deref()).await;
        let env = Env { path: request.path.clone(), hostname: request.hostname.clone(), ip: request.ip.clone() };
        let mut response = PageResponse { set_cookie, ..PageResponse::default() };

        let Some(found) = self.store.routes().resolve(&request.path) else {
            error!(target: "syncframe::request", "404 NOT FOUND: GET {}", request.path);
            let dir = parent_dir(&request.path);
            response.status = 404;
            response.body = self.store.render_error_page(dir, 404, not_found_value(&env), &env).await;
            return response;
        };
        let entry = found.entry.clone();
        let params = found.params;

        let (route, compiled) = match self.store.compiled(&entry).await {
            Ok(compiled) => compiled,
            Err(e) => {
                error!("unable to compile {}: {e}", entry.file);
                let error = json!({
                    "path": env.path,
                    "name": "CompileError",
                    "message": e.to_string(),
                    "title": "Internal Server Error",
                });
                response.status = 500;
                response.body = self.store.render_error_page(parent_dir(&entry.file), 500, error, &env).await;
                return response;
            },
        };

        let data = RequestData {
            trigger: None,
            payload: Value::Null,
            params: params.clone(),
            query: request.query.clone(),
            env: env.clone(),
        };
        let mut ctx = RenderContext::new(Mode::Mount, Arc::clone(&route), Arc::clone(&self.store), data, session);
        let module = Arc::clone(route.handlers().module());

        let mut failed = false;
        let state = match module.mount(&mut ctx, ConnectionState::new()).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                warn!("mount of {} returned no state", route.endpoint());
                panel::rollback(&mut ctx);
                ConnectionState::new()
            },
            Err(e) => {
                error!("mount of {} failed: {e}", route.endpoint());
                panel::rollback(&mut ctx);
                ctx.discard_emissions();
                failed = true;
                ctx.server_error(ConnectionState::new(), &e).await
            },
        };

        if !failed && ctx.session.is_dirty() {
            if let Err(e) = self.store.sessions().save(&ctx.session).await {
                error!("unable to save session {}: {e}", ctx.session.id());
            }
        }
        let session_id = ctx.session.id().to_string();

        let compile = if compiled { " ▷ COMPILE" } else { "" };
        let morph = if request.morph { " (morph)" } else { "" };

        match ctx.take_emissions().pop() {
            Some(Emission::Redirect(url)) => {
                info!(target: "syncframe::request", "GET {}{compile} ▷ REDIRECT ▷ {url}{morph}", request.path);
                if request.morph {
                    response.status = 200;
                    response.morph_redirect = Some(url);
                } else {
                    response.status = 302;
                    response.location = Some(url);
                }
            },
            Some(Emission::Document { status, html }) => {
                info!(target: "syncframe::request", "GET {}{compile} ▷ RENDER{morph}", request.path);
                response.status = status;
                response.body = html;

                if status == 200 {
                    let mounted = Mounted { route, state, params, query: request.query, env, session_id };
                    if request.morph {
                        self.rebind(request.connection_id.as_deref(), mounted);
                    } else {
                        let token = uuid::Uuid::new_v4().to_string();
                        response.body = stamp_root_attribute(&response.body, MOUNT_ATTRIBUTE, &token);
                        self.store.stash_mount(token.clone(), mounted);
                        response.mount_token = Some(token);
                    }
                }
            },
            Some(Emission::Instructions(_)) | None => {
                info!(target: "syncframe::request", "GET {}{compile} ▷ EMPTY{morph}", request.path);
                response.status = 200;
            },
        }

        response
    }

    /// Open a live connection for a pending mount.
    pub fn connect(&self, token: &str) -> Result<Connection, ServerError> {
        let mounted = self.store.claim_mount(token).ok_or_else(|| ServerError::UnknownMount(token.to_string()))?;
        Ok(connection::spawn(Arc::clone(&self.store), mounted))
    }

    async fn open_session(&self, cookie: Option<&str>) -> (Session, Option<String>) {
        if let Some(id) = cookie.filter(|id| !id.is_empty()) {
            match self.store.sessions().load(id).await {
                Ok(session) => return (session, None),
                Err(e) => {
                    error!("unable to load session {id}: {e}");
                    return (Session::new(id), None);
                },
            }
        }
        let id = uuid::Uuid::new_v4().to_string();
        let cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax");
        (Session::new(id), Some(cookie))
    }

    fn rebind(&self, connection_id: Option<&str>, mounted: Mounted) {
        let Some(connection_id) = connection_id else {
            return;
        };
        let inbox = {
            let connections = self.store.connections();
            match connections.info(connection_id) {
                Some(info) if info.session_id == mounted.session_id => connections.inbox(connection_id),
                Some(_) => {
                    warn!("connection {connection_id} belongs to another session; not rebinding");
                    None
                },
                None => None,
            }
        };
        match inbox {
            Some(inbox) => {
                if inbox.send(ConnectionInput::Rebind(Box::new(mounted))).is_err() {
                    warn!("connection {connection_id} closed before rebind");
                }
            },
            None => warn!("no live connection {connection_id} to rebind"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    async fn app(source: MemorySource) -> App {
        App::new(Arc::new(source), ModuleRegistry::new(), StoreConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn first_get_creates_a_session() {
        let app = app(MemorySource::new().with_file("index.html", "<html><body>hi</body></html>")).await;

        let response = app.get(PageRequest::get("/")).await;

        assert_eq!(response.status, 200);
        assert!(response.set_cookie.as_deref().is_some_and(|c| c.starts_with("session_id=")));
    }

    #[tokio::test]
    async fn known_session_is_reused() {
        let app = app(MemorySource::new().with_file("index.html", "<html><body>hi</body></html>")).await;

        let response = app.get(PageRequest::get("/").with_session("abc")).await;

        assert_eq!(response.set_cookie, None);
    }

    #[tokio::test]
    async fn fresh_get_stamps_mount_token() {
        let app = app(MemorySource::new().with_file("index.html", "<html><body>hi</body></html>")).await;

        let response = app.get(PageRequest::get("/")).await;
        let token = response.mount_token.clone().unwrap();

        assert!(response.body.contains(&format!("<html s-mount=\"{token}\">")));
        assert_eq!(app.store().pending_mounts(), 1);
    }

    #[tokio::test]
    async fn morph_get_does_not_stash() {
        let app = app(MemorySource::new().with_file("index.html", "<html><body>hi</body></html>")).await;

        let response = app.get(PageRequest::get("/").morph(None)).await;

        assert_eq!(response.mount_token, None);
        assert!(!response.body.contains("s-mount"));
        assert_eq!(app.store().pending_mounts(), 0);
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let app = app(
            MemorySource::new()
                .with_file("index.html", "<p>home</p>")
                .with_file("_404.html", "<h1><%= error.title %>: <%= error.path %></h1>"),
        )
        .await;

        let response = app.get(PageRequest::get("/missing")).await;

        assert_eq!(response.status, 404);
        assert_eq!(response.body, "<h1>Not Found: /missing</h1>");
    }

    #[tokio::test]
    async fn unknown_mount_token_is_rejected() {
        let app = app(MemorySource::new().with_file("index.html", "<p>home</p>")).await;
        assert!(matches!(app.connect("nope"), Err(ServerError::UnknownMount(_))));
    }
}
