//! # Live camera/telemetry stream
//!
//! ```text
//!  perception process                       dashboard
//! ┌──────────────────┐   websocket   ┌─────────────────────────────┐
//! │ JSON record or   │ ────────────► │ Transport ─► decoder ─┐     │
//! │ bare base64 JPEG │               │                       ▼     │
//! └──────────────────┘               │ RateCounter ─► StreamObservation ─► watch
//!                                    └─────────────────────────────┘
//! ```
//!
//! | Module      | Purpose                                              |
//! |-------------|------------------------------------------------------|
//! | `types`     | `Frame`, `AnalysisStatus`, `StreamObservation`       |
//! | `decoder`   | Structured / legacy message decoding                 |
//! | `rate`      | One-second arrival buckets                           |
//! | `transport` | `Transport` / `Session` seam and the websocket impl  |
//! | `client`    | `StreamClient`: reconnect loop and teardown          |

pub mod client;
pub mod decoder;
pub mod rate;
pub mod transport;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────

pub use client::{
    DEFAULT_ENDPOINT, DEFAULT_RECONNECT_DELAY, StreamClient, StreamConfig, normalize_endpoint,
};
pub use decoder::StreamUpdate;
pub use rate::{RATE_WINDOW, RateCounter};
pub use transport::{Payload, Session, Transport, WebSocketTransport, WebSocketSession};
pub use types::{AnalysisStatus, FRAME_MEDIA_TYPE, Frame, StreamObservation};
