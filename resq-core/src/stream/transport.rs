//! Transport seam between the stream worker and the network.
//!
//! The worker only needs two things from a transport: open a session to
//! an endpoint, and pull messages from that session until it ends.
//! [`WebSocketTransport`] is the production implementation; tests drive
//! the worker through scripted implementations of the same traits.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::error::StreamError;

/// One inbound data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

/// Opens sessions to an endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a session. Resolves once the endpoint has acknowledged the
    /// open, or fails.
    async fn open(&self, endpoint: &str) -> Result<Box<dyn Session>, StreamError>;
}

/// An open, receive-only session.
#[async_trait]
pub trait Session: Send {
    /// Next data message.
    ///
    /// `None` means the session closed; `Some(Err(_))` is a transport
    /// error, after which the session is abandoned. Must be cancel-safe:
    /// the worker polls it inside `tokio::select!`.
    async fn next_payload(&mut self) -> Option<Result<Payload, StreamError>>;

    /// Close the session. Errors are swallowed.
    async fn close(&mut self);
}

// ── WebSocket ────────────────────────────────────────────────────

/// Websocket transport over `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn Session>, StreamError> {
        let (socket, _) = connect_async(endpoint).await?;
        Ok(Box::new(WebSocketSession { socket }))
    }
}

/// Session half of [`WebSocketTransport`].
pub struct WebSocketSession {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Session for WebSocketSession {
    async fn next_payload(&mut self) -> Option<Result<Payload, StreamError>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(Ok(Payload::Text(text.as_str().to_owned())));
                }
                Ok(Message::Binary(bytes)) => return Some(Ok(Payload::Binary(bytes))),
                // Pongs are queued by tungstenite and flushed on the next read.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "endpoint sent close");
                    return None;
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.close(None).await {
            debug!("websocket close: {e}");
        }
    }
}
