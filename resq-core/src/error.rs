//! Domain-specific error types for the ResQ stream client.
//!
//! None of these ever escape the client's background task: the stream
//! worker logs them and degrades to `connected = false`. They are public
//! so that transports, configuration validation and frame decoding can
//! report failures in a typed way.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// The canonical error type for the stream client.
#[derive(Debug, Error)]
pub enum StreamError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The websocket layer reported an error (open, read or close).
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// A non-websocket transport failed. Used by alternative
    /// [`Transport`](crate::stream::Transport) implementations.
    #[error("transport error: {0}")]
    Transport(String),

    // ── Protocol Errors ──────────────────────────────────────────
    /// A connection-state transition was requested from the wrong state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Payload Errors ───────────────────────────────────────────
    /// A frame payload is not valid base64.
    #[error("invalid frame payload: {0}")]
    FramePayload(#[from] base64::DecodeError),

    // ── Configuration Errors ─────────────────────────────────────
    /// The client configuration is unusable.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl From<String> for StreamError {
    fn from(s: String) -> Self {
        StreamError::Transport(s)
    }
}

impl From<&str> for StreamError {
    fn from(s: &str) -> Self {
        StreamError::Transport(s.to_string())
    }
}
