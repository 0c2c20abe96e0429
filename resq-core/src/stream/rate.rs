//! Arrival-rate accounting.

use std::time::Duration;

/// Length of one reporting bucket.
pub const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Counts arrivals in the current bucket.
///
/// The owner calls [`record`](Self::record) per arrival and
/// [`take`](Self::take) once per [`RATE_WINDOW`]; the value returned by
/// `take` is the rate for the bucket that just closed. Buckets are not
/// smoothed into each other.
#[derive(Debug, Default)]
pub struct RateCounter {
    count: u32,
}

impl RateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one arrival.
    pub fn record(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    /// Close the bucket: return its count and start a new one at zero.
    pub fn take(&mut self) -> u32 {
        std::mem::take(&mut self.count)
    }
}
