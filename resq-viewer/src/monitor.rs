//! Status monitor. Turns observation updates into operator log lines.
//!
//! Stands in for the dashboard panels: instead of drawing the frame it
//! reports what changed between consecutive observations.

use resq_core::{AnalysisStatus, StreamObservation};
use tracing::{info, warn};

/// One operator-relevant change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Connected,
    Disconnected,
    VictimDetected,
    VictimCleared,
    Status(AnalysisStatus),
    Narrative(String),
}

/// Diffs consecutive observations.
#[derive(Debug, Default)]
pub struct StatusMonitor {
    last: StreamObservation,
}

impl StatusMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `obs` and return what changed since the previous one.
    ///
    /// Frame and rate changes are not events; they show up in the
    /// summary line.
    pub fn update(&mut self, obs: &StreamObservation) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        let last = &self.last;

        if obs.connected != last.connected {
            events.push(if obs.connected {
                StatusEvent::Connected
            } else {
                StatusEvent::Disconnected
            });
        }
        if obs.victim_detected != last.victim_detected {
            events.push(if obs.victim_detected {
                StatusEvent::VictimDetected
            } else {
                StatusEvent::VictimCleared
            });
        }
        if obs.analysis_status != last.analysis_status {
            events.push(StatusEvent::Status(obs.analysis_status.clone()));
        }
        if obs.analysis_narrative != last.analysis_narrative && !obs.analysis_narrative.is_empty()
        {
            events.push(StatusEvent::Narrative(obs.analysis_narrative.clone()));
        }

        self.last = obs.clone();
        events
    }

    /// Emit `events` as log lines.
    pub fn report(&self, events: &[StatusEvent]) {
        for event in events {
            match event {
                StatusEvent::Connected => info!("camera feed online"),
                StatusEvent::Disconnected => warn!("camera feed lost; showing last frame"),
                StatusEvent::VictimDetected => warn!(
                    frame = self.last.frame.as_ref().map(|f| f.sequence()),
                    "VICTIM DETECTED"
                ),
                StatusEvent::VictimCleared => info!("victim no longer in view"),
                StatusEvent::Status(status) => info!(%status, "analyzer status"),
                StatusEvent::Narrative(text) => info!("analyzer: {text}"),
            }
        }
    }
}

/// One-line summary of an observation.
pub fn status_line(obs: &StreamObservation) -> String {
    let link = if obs.connected { "LIVE" } else { "OFFLINE" };
    let frame = match &obs.frame {
        Some(f) => format!("#{}", f.sequence()),
        None => "none".to_string(),
    };
    let victim = if obs.victim_detected { " VICTIM" } else { "" };
    format!(
        "[{link}] {} fps | frame {frame} | ai {}{victim}",
        obs.frames_per_second, obs.analysis_status
    )
}

// ── Tests ────────────────────────────────────────────────────────
