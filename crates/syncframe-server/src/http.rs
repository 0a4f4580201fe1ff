//! HTTP/1 front end.
//!
//! Serves route GETs through [`App::get`] and upgrades
//! `/_syncframe?mount=<token>` to a WebSocket bound to the pending mount.

use std::{collections::BTreeMap, convert::Infallible, net::SocketAddr};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode,
    body::Incoming,
    header::{self, HeaderName, HeaderValue},
};
use hyper_util::rt::TokioIo;
use syncframe_proto::names::{
    CONNECTION_ID_HEADER, MORPH_HEADER, MOUNT_QUERY, REDIRECT_HEADER, SESSION_COOKIE, SOCKET_PATH,
};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};
use tungstenite::{handshake::derive_accept_key, protocol::Role};

use crate::{
    app::{App, PageRequest, PageResponse},
    transport,
};

type Body = Full<Bytes>;

/// Handle one HTTP request.
pub async fn handle(app: App, request: Request<Incoming>, peer: SocketAddr) -> Result<Response<Body>, Infallible> {
    if request.method() != Method::GET {
        return Ok(plain(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"));
    }
    if request.uri().path() == SOCKET_PATH {
        return Ok(upgrade(&app, request));
    }

    let page = page_request(&request, peer);
    let response = app.get(page).await;
    Ok(page_response(response))
}

fn page_request(request: &Request<Incoming>, peer: SocketAddr) -> PageRequest {
    let headers = request.headers();
    let header_str = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

    let hostname = header_str(header::HOST.as_str())
        .map(|host| host.rsplit_once(':').map_or(host, |(name, _)| name).to_string())
        .unwrap_or_default();

    PageRequest {
        path: request.uri().path().to_string(),
        query: parse_query(request.uri().query().unwrap_or("")),
        hostname,
        ip: peer.ip().to_string(),
        session_id: header_str(header::COOKIE.as_str()).and_then(|cookies| cookie(cookies, SESSION_COOKIE)),
        morph: header_str(MORPH_HEADER) == Some("true"),
        connection_id: header_str(CONNECTION_ID_HEADER).map(str::to_string),
    }
}

fn page_response(page: PageResponse) -> Response<Body> {
    let status = StatusCode::from_u16(page.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = Response::new(Full::new(Bytes::from(page.body)));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));

    let extra = [
        (header::SET_COOKIE, page.set_cookie),
        (header::LOCATION, page.location),
        (HeaderName::from_static(REDIRECT_HEADER), page.morph_redirect),
    ];
    for (name, value) in extra {
        let Some(value) = value else { continue };
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                headers.insert(name, value);
            },
            Err(e) => warn!("dropping invalid {name} header: {e}"),
        }
    }
    response
}

fn upgrade(app: &App, request: Request<Incoming>) -> Response<Body> {
    let headers = request.headers();
    let is_upgrade = headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"));
    let Some(key) = headers.get(header::SEC_WEBSOCKET_KEY).filter(|_| is_upgrade) else {
        return plain(StatusCode::BAD_REQUEST, "expected a websocket upgrade");
    };
    let accept = derive_accept_key(key.as_bytes());

    let query = parse_query(request.uri().query().unwrap_or(""));
    let Some(token) = query.get(MOUNT_QUERY) else {
        return plain(StatusCode::BAD_REQUEST, "missing mount token");
    };
    let connection = match app.connect(token) {
        Ok(connection) => connection,
        Err(e) => {
            warn!("rejecting socket: {e}");
            return plain(StatusCode::NOT_FOUND, "unknown mount");
        },
    };

    tokio::spawn(async move {
        match hyper::upgrade::on(request).await {
            Ok(upgraded) => {
                let ws = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
                transport::pump(ws, connection).await;
            },
            Err(e) => debug!("websocket upgrade failed: {e}"),
        }
    });

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
    if let Ok(accept) = HeaderValue::from_str(&accept) {
        headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    }
    response
}

fn plain(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

/// Value of cookie `name` in a `Cookie` header.
fn cookie(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Decode `a=1&b=x%20y`. Later keys win.
pub(crate) fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(key), percent_decode(value))
        })
        .collect()
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 2;
                    },
                    None => out.push(b'%'),
                }
            },
            byte => out.push(byte),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
