//! Published stream state.
//!
//! [`StreamObservation`] is the value presentation collaborators read
//! from the client's watch channel. Everything in it is cheap to clone:
//! the frame payload is shared behind an `Arc`.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;

use crate::error::StreamError;

/// Media type assumed for every frame payload.
pub const FRAME_MEDIA_TYPE: &str = "image/jpeg";

// ── Frame ────────────────────────────────────────────────────────

/// One encoded still image received from the endpoint.
///
/// The payload is kept exactly as it arrived on the wire (base64 text)
/// and is never validated by the client; [`Frame::to_bytes`] decodes it
/// on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    sequence: u64,
    encoded: Arc<str>,
}

impl Frame {
    /// Wrap a base64 payload as frame number `sequence`.
    pub fn new(sequence: u64, encoded: impl Into<Arc<str>>) -> Self {
        Self {
            sequence,
            encoded: encoded.into(),
        }
    }

    /// Position of this frame in the stream, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The payload as received.
    pub fn as_base64(&self) -> &str {
        &self.encoded
    }

    /// A displayable image reference (`data:` URI).
    pub fn data_uri(&self) -> String {
        format!("data:{FRAME_MEDIA_TYPE};base64,{}", self.encoded)
    }

    /// Decode the payload into raw image bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StreamError> {
        Ok(BASE64_STANDARD.decode(self.encoded.as_bytes())?)
    }
}

// ── AnalysisStatus ───────────────────────────────────────────────

/// Status reported by the remote analyzer.
///
/// Values outside the known set are kept verbatim in `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AnalysisStatus {
    #[default]
    Idle,
    Scanning,
    Cooldown,
    Unknown(String),
}

impl AnalysisStatus {
    /// Wire form of the status.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Cooldown => "cooldown",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<&str> for AnalysisStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "idle" => Self::Idle,
            "scanning" => Self::Scanning,
            "cooldown" => Self::Cooldown,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for AnalysisStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "idle" | "scanning" | "cooldown" => Self::from(raw.as_str()),
            _ => Self::Unknown(raw),
        }
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── StreamObservation ────────────────────────────────────────────

/// The continuously updated state a [`StreamClient`](super::StreamClient)
/// publishes.
///
/// Nothing here is cleared on disconnect: the last frame, detection and
/// analysis fields stay visible (stale) until the next update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamObservation {
    /// Most recent frame, `None` until the first one arrives.
    pub frame: Option<Frame>,
    /// Whether the transport is currently open.
    pub connected: bool,
    /// Arrivals counted in the last completed one-second window.
    pub frames_per_second: u32,
    /// Whether the latest report flagged a victim in view.
    pub victim_detected: bool,
    /// Latest analyzer status.
    pub analysis_status: AnalysisStatus,
    /// Latest free-text analyzer response.
    pub analysis_narrative: String,
}

impl StreamObservation {
    /// Sequence number the next produced frame will carry.
    pub(crate) fn next_frame_sequence(&self) -> u64 {
        self.frame.as_ref().map_or(1, |f| f.sequence() + 1)
    }
}

// ── Tests ────────────────────────────────────────────────────────
