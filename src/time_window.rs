//! Arrival windows derived from scheduled times.
//!
//! Every window is expressed in seconds from the earliest scheduled time of
//! the working set; the buffer is configured in minutes. Nothing here reads the clock, so identical inputs always
//! produce identical windows.

use serde::{Deserialize, Serialize};

/// Minutes of slack on either side of a scheduled time.
pub const DEFAULT_BUFFER_MINUTES: i64 = 15;

/// Feasible arrival interval in seconds from the base time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
    /// Unclamped scheduled offset; used to break cost ties.
    pub target: i64,
}

impl TimeWindow {
    pub const fn from_minutes(start: i64, end: i64, target: i64) -> Self {
        Self {
            start: start.saturating_mul(60),
            end: end.saturating_mul(60),
            target: target.saturating_mul(60),
        }
    }

    /// Whether arriving at `seconds` is on time. Early arrivals wait.
    pub fn admits_arrival(&self, seconds: i64) -> bool {
        seconds <= self.end
    }
}

/// Derive one window per scheduled time, aligned by position.
///
/// `scheduled` holds unix timestamps in seconds. Offsets keep their seconds;
/// the buffer saturates rather than overflowing.
pub fn derive_windows(scheduled: &[i64], buffer_minutes: i64) -> Vec<TimeWindow> {
    let Some(&base) = scheduled.iter().min() else {
        return Vec::new();
    };
    let buffer = buffer_minutes.max(0).saturating_mul(60);

    scheduled
        .iter()
        .map(|&time| {
            let center = time.saturating_sub(base);
            TimeWindow {
                start: center.saturating_sub(buffer).max(0),
                end: center.saturating_add(buffer),
                target: center,
            }
        })
        .collect()
}
