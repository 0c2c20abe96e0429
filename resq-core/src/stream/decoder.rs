//! Inbound message decoder.
//!
//! Two wire shapes are accepted:
//!
//! - **Structured record**: a JSON object with optional `frame`,
//!   `victim`, `ai_status` and `ai_response` keys. Only the keys present
//!   are applied; everything else in the observation is left alone.
//! - **Legacy payload**: anything that is not a JSON object is taken to
//!   be a bare base64 image from an older sender.
//!
//! There is no version field; the shape is detected by whether the
//! structured parse succeeds.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::stream::transport::Payload;
use crate::stream::types::{AnalysisStatus, Frame, StreamObservation};

// ── StreamUpdate ─────────────────────────────────────────────────

/// The fields one inbound message asks to change.
///
/// `None` means "leave as is".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamUpdate {
    /// Replacement frame payload (base64).
    pub frame: Option<String>,
    /// New detection flag.
    pub victim: Option<bool>,
    /// New analyzer status.
    pub status: Option<AnalysisStatus>,
    /// New analyzer narrative. `Some("")` clears it.
    pub narrative: Option<String>,
    /// Whether the message was read through the legacy fallback.
    pub legacy: bool,
}

impl StreamUpdate {
    fn legacy_frame(encoded: String) -> Self {
        Self {
            frame: Some(encoded),
            legacy: true,
            ..Self::default()
        }
    }

    /// Apply the update to `obs`. Returns whether anything changed.
    pub fn apply(self, obs: &mut StreamObservation) -> bool {
        let mut changed = false;

        if let Some(encoded) = self.frame {
            let sequence = obs.next_frame_sequence();
            obs.frame = Some(Frame::new(sequence, encoded));
            changed = true;
        }
        if let Some(victim) = self.victim {
            changed |= obs.victim_detected != victim;
            obs.victim_detected = victim;
        }
        if let Some(status) = self.status {
            changed |= obs.analysis_status != status;
            obs.analysis_status = status;
        }
        if let Some(narrative) = self.narrative {
            changed |= obs.analysis_narrative != narrative;
            obs.analysis_narrative = narrative;
        }

        changed
    }
}

// ── Envelope ─────────────────────────────────────────────────────

/// Structured record as sent by current senders.
///
/// Fields are kept as raw JSON so that one badly typed key does not
/// discard the rest of the record.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Envelope {
    frame: Value,
    victim: Value,
    ai_status: Value,
    ai_response: Value,
}

// ── Decoding ─────────────────────────────────────────────────────

/// Decode one inbound transport message.
///
/// Never fails: a payload that is not a structured record becomes a
/// legacy frame.
pub fn decode(payload: &Payload) -> StreamUpdate {
    match payload {
        Payload::Text(text) => decode_text(text),
        Payload::Binary(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => decode_text(text),
            Err(_) => StreamUpdate::legacy_frame(BASE64_STANDARD.encode(bytes)),
        },
    }
}

/// Decode a text message.
pub fn decode_text(text: &str) -> StreamUpdate {
    let record = match serde_json::from_str::<Value>(text) {
        Ok(record @ Value::Object(_)) => record,
        _ => return StreamUpdate::legacy_frame(text.to_owned()),
    };

    // An object always fits `Envelope`: every field is an untyped `Value`.
    let envelope = match serde_json::from_value::<Envelope>(record) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!("unreadable record ({e}); treating as empty");
            return StreamUpdate::default();
        }
    };

    StreamUpdate {
        frame: non_empty_string("frame", envelope.frame),
        // An explicit null leaves the current value in place, same as a
        // missing key; it does not reset the flag or the narrative.
        victim: match envelope.victim {
            Value::Null => None,
            Value::Bool(flag) => Some(flag),
            other => ignore("victim", &other),
        },
        status: non_empty_string("ai_status", envelope.ai_status).map(AnalysisStatus::from),
        narrative: match envelope.ai_response {
            Value::Null => None,
            Value::String(text) => Some(text),
            other => ignore("ai_response", &other),
        },
        legacy: false,
    }
}

fn non_empty_string(field: &'static str, value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => ignore(field, &other),
    }
}

fn ignore<T>(field: &'static str, value: &Value) -> Option<T> {
    debug!(field, %value, "ignoring field with unexpected type");
    None
}

// ── Tests ────────────────────────────────────────────────────────
