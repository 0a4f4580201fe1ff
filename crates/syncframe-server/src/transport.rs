//! WebSocket framing for a live connection.
//!
//! Server messages go out as JSON text frames from a writer task; client
//! frames are decoded on the reading side and queued on the connection. A
//! frame that is not a valid client message closes the socket.

use futures_util::{SinkExt, StreamExt};
use syncframe_proto::ClientMessage;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};
use tungstenite::Message;

use crate::connection::Connection;

/// Pump messages between `ws` and `connection` until either side closes.
pub async fn pump<S>(ws: WebSocketStream<S>, connection: Connection)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id = connection.id().to_string();
    let (sender, mut outbound) = connection.into_parts();
    let (mut sink, mut stream) = ws.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!("dropping unencodable message: {e}");
                    continue;
                },
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!("connection {id}: read error: {e}");
                break;
            },
        };
        match frame {
            Message::Text(text) => match ClientMessage::from_json(&text) {
                Ok(ClientMessage::Action(action)) => {
                    if sender.send(action).is_err() {
                        break;
                    }
                },
                Err(e) => {
                    warn!("connection {id}: closing after malformed message: {e}");
                    break;
                },
            },
            Message::Close(_) => break,
            Message::Binary(_) => {
                warn!("connection {id}: closing after unexpected binary frame");
                break;
            },
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {},
        }
    }

    drop(sender);
    let _ = writer.await;
    debug!("connection {id}: socket closed");
}
