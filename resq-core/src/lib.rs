//! # resq-core
//!
//! Live stream client for the ResQ search-and-rescue robot dashboard.
//!
//! This crate contains:
//! - **Stream**: `StreamClient`, which keeps one websocket connection to
//!   the robot's perception process alive and publishes the latest
//!   frame, detection flag, analyzer status and frame rate
//! - **State**: the `ConnectionState` machine the client runs on
//! - **Error**: `StreamError`, a typed `thiserror`-based error

pub mod error;
pub mod state;
pub mod stream;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use error::StreamError;
pub use state::ConnectionState;
pub use stream::{
    AnalysisStatus, Frame, Payload, Session, StreamClient, StreamConfig, StreamObservation,
    Transport, WebSocketTransport,
};
