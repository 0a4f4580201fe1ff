//! In-process transport between a client runtime and a server [`App`].
//!
//! [`LoopbackTransport`] implements the client [`Transport`] trait by
//! calling the server directly: channel messages go through the
//! connection's inbox and outbox, and morph fetches become
//! [`App::get`] calls carrying the session cookie and connection id.

use std::collections::BTreeMap;

use async_trait::async_trait;
use syncframe_client::{ClientError, ClientRuntime, Driver, FetchRequest, FetchResponse, Transport};
use syncframe_proto::{ClientMessage, ServerMessage, names::SESSION_COOKIE};
use syncframe_server::{App, Connection, PageRequest};
use tracing::debug;

/// Host name reported to templates for loopback requests.
pub const LOOPBACK_HOST: &str = "localhost";

/// Transport wired straight into an [`App`].
#[derive(Debug)]
pub struct LoopbackTransport {
    app: App,
    session_id: Option<String>,
    connection: Connection,
}

impl LoopbackTransport {
    /// Load `path` like a browser would and claim its mount.
    ///
    /// Returns a driver whose runtime holds the loaded page. The server's
    /// hello message is still queued on the channel.
    pub async fn open(app: &App, path: &str) -> Result<Driver<Self>, ClientError> {
        let page = app.get(page_request(path, None)).await;
        let session_id = page.set_cookie.as_deref().and_then(session_from_cookie);
        let runtime = ClientRuntime::load(path, &page.body);
        let token = runtime.mount_token().ok_or_else(|| ClientError::NoMountToken(path.to_string()))?;
        let connection = app.connect(token).map_err(|e| ClientError::Transport(e.to_string()))?;
        debug!("loopback connection {} opened on {path}", connection.id());

        Ok(Driver::new(runtime, Self { app: app.clone(), session_id, connection }))
    }

    /// Session cookie value.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Server-side id of the connection.
    pub fn connection_id(&self) -> &str {
        self.connection.id()
    }

    /// Next queued server message without waiting.
    pub fn try_recv(&mut self) -> Option<ServerMessage> {
        self.connection.try_recv()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: ClientMessage) -> Result<(), ClientError> {
        // Round-trip through the wire format so encoding stays exercised.
        let wire = ClientMessage::from_json(&message.to_json()?)?;
        let ClientMessage::Action(action) = wire;
        self.connection.send(action).map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<ServerMessage>, ClientError> {
        match self.connection.recv().await {
            Some(message) => Ok(Some(ServerMessage::from_json(&message.to_json()?)?)),
            None => Ok(None),
        }
    }

    async fn fetch(&mut self, request: &FetchRequest) -> Result<FetchResponse, ClientError> {
        let mut page_request = page_request(request.target(), self.session_id.clone());
        page_request = page_request.morph(request.connection_id.clone());
        let page = self.app.get(page_request).await;
        Ok(FetchResponse { status: page.status, redirect: page.morph_redirect, body: page.body })
    }
}

fn page_request(target: &str, session_id: Option<String>) -> PageRequest {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let mut request = PageRequest::get(path);
    request.query = parse_query(query);
    request.hostname = LOOPBACK_HOST.to_string();
    request.ip = "127.0.0.1".to_string();
    request.session_id = session_id;
    request
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key.to_string(), value.to_string())
        })
        .collect()
}

/// Session id from a `Set-Cookie` value.
fn session_from_cookie(cookie: &str) -> Option<String> {
    let pair = cookie.split(';').next()?.trim();
    let value = pair.strip_prefix(SESSION_COOKIE)?.strip_prefix('=')?;
    Some(value.to_string())
}
