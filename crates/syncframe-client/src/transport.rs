//! WebSocket and HTTP transport.
//!
//! Provides [`WebSocketTransport`], which loads a page over HTTP, claims its
//! pending mount over a WebSocket, and performs morph fetches with the
//! session cookie of the first load. This is a thin layer: protocol logic
//! remains in the Sans-IO [`ClientRuntime`].

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::{BodyExt, Empty};
use hyper::{
    Request,
    header::{COOKIE, HOST, SET_COOKIE},
};
use hyper_util::rt::TokioIo;
use syncframe_proto::{
    ClientMessage, ServerMessage,
    names::{MOUNT_QUERY, REDIRECT_HEADER, SOCKET_PATH},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::{
    driver::{Driver, Transport},
    error::ClientError,
    event::{FetchRequest, FetchResponse},
    runtime::ClientRuntime,
};

/// Client side of a live page: WebSocket channel plus HTTP fetches.
pub struct WebSocketTransport {
    addr: String,
    cookie: Option<String>,
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport").field("addr", &self.addr).field("cookie", &self.cookie).finish()
    }
}

/// Load `path` from the server at `addr` (`host:port`) and open its channel.
pub async fn connect(addr: &str, path: &str) -> Result<Driver<WebSocketTransport>, ClientError> {
    let page = get(addr, path, None, &[]).await?;
    let cookie = page.set_cookie.and_then(|value| value.split(';').next().map(str::to_string));
    let runtime = ClientRuntime::load(path, &page.body);
    let token = runtime.mount_token().ok_or_else(|| ClientError::NoMountToken(path.to_string()))?;

    let url = format!("ws://{addr}{SOCKET_PATH}?{MOUNT_QUERY}={token}");
    let (socket, _) =
        connect_async(url).await.map_err(|e| ClientError::Transport(format!("websocket connect failed: {e}")))?;
    debug!("channel open for {path}");

    Ok(Driver::new(runtime, WebSocketTransport { addr: addr.to_string(), cookie, socket }))
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: ClientMessage) -> Result<(), ClientError> {
        let text = message.to_json()?;
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| ClientError::Transport(format!("send failed: {e}")))
    }

    async fn recv(&mut self) -> Result<Option<ServerMessage>, ClientError> {
        while let Some(frame) = self.socket.next().await {
            match frame.map_err(|e| ClientError::Transport(format!("receive failed: {e}")))? {
                Message::Text(text) => return Ok(Some(ServerMessage::from_json(&text)?)),
                Message::Close(_) => return Ok(None),
                Message::Binary(_) => warn!("ignoring binary frame"),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {},
            }
        }
        Ok(None)
    }

    async fn fetch(&mut self, request: &FetchRequest) -> Result<FetchResponse, ClientError> {
        let headers = request.headers();
        let page = get(&self.addr, request.target(), self.cookie.as_deref(), &headers).await?;
        Ok(FetchResponse { status: page.status, redirect: page.redirect, body: page.body })
    }
}

struct Page {
    status: u16,
    redirect: Option<String>,
    set_cookie: Option<String>,
    body: String,
}

/// One-shot HTTP/1.1 GET over a fresh connection.
async fn get(
    addr: &str,
    target: &str,
    cookie: Option<&str>,
    headers: &[(&'static str, String)],
) -> Result<Page, ClientError> {
    let stream =
        TcpStream::connect(addr).await.map_err(|e| ClientError::Transport(format!("connect to {addr} failed: {e}")))?;
    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| ClientError::Transport(format!("handshake failed: {e}")))?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!("http connection ended: {e}");
        }
    });

    let mut builder = Request::get(target).header(HOST, addr);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    let request = builder
        .body(Empty::<Bytes>::new())
        .map_err(|e| ClientError::Transport(format!("invalid request for {target}: {e}")))?;

    let response =
        sender.send_request(request).await.map_err(|e| ClientError::Transport(format!("GET {target} failed: {e}")))?;
    let header = |name: &str| response.headers().get(name).and_then(|value| value.to_str().ok()).map(str::to_string);
    let status = response.status().as_u16();
    let redirect = header(REDIRECT_HEADER);
    let set_cookie = header(SET_COOKIE.as_str());

    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| ClientError::Transport(format!("reading {target} failed: {e}")))?
        .to_bytes();

    Ok(Page { status, redirect, set_cookie, body: String::from_utf8_lossy(&body).into_owned() })
}
