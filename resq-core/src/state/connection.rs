//! Connection state machine for the stream client.
//!
//! Provides a `ConnectionState` enum that models the lifecycle of the
//! single connection a [`StreamClient`](crate::stream::StreamClient)
//! owns, with validated transitions that return `Result` instead of
//! panicking.

use crate::error::StreamError;

// ── ConnectionState ──────────────────────────────────────────────

/// The current state of the stream connection.
///
/// ```text
///  Disconnected ──► Connecting ──► Connected
///       ▲                │              │
///       └────────────────┴──────────────┘
///          open failure / close / error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport open or pending. Initial state, and the state the
    /// client rests in while waiting for a reconnect.
    #[default]
    Disconnected,

    /// A transport open has been issued and not yet acknowledged.
    Connecting,

    /// The endpoint acknowledged the open; messages may arrive.
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

impl ConnectionState {
    /// Returns `true` when the transport is open.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` when no transport is open or pending.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(StreamError::ProtocolViolation(
                "cannot connect: not in Disconnected state",
            )),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected;
                Ok(())
            }
            _ => Err(StreamError::ProtocolViolation(
                "cannot complete connect: not in Connecting state",
            )),
        }
    }

    /// Transition to `Disconnected`.
    ///
    /// Valid from: `Connecting` (open failure), `Connected` (close or
    /// transport error).
    pub fn finish_disconnect(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Connecting | Self::Connected => {
                *self = Self::Disconnected;
                Ok(())
            }
            Self::Disconnected => Err(StreamError::ProtocolViolation(
                "cannot disconnect: already Disconnected",
            )),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
