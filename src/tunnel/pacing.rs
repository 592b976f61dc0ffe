//! Padding cadence for the client uplink.
//!
//! The tokio timer fires on millisecond ticks, so sleeping a fixed 500us after
//! every padding frame would halve the intended rate. The pacer keeps a
//! schedule of due times instead and lets a late wakeup catch up, bounded so a
//! long busy stretch never turns into a padding burst.

use std::time::Duration;

use tokio::time::Instant;

/// How far behind schedule the pacer may fall before it restarts from now.
pub const MAX_PACING_LAG: Duration = Duration::from_millis(2);

/// Schedule of padding due times.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    /// Configured interval between padding frames.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the next padding frame is due.
    ///
    /// A deadline at or before `now` means "send immediately".
    pub fn next_deadline(&mut self, now: Instant) -> Instant {
        let max_lag = MAX_PACING_LAG.max(self.interval);
        let due = match self.next_due {
            Some(due) if now.saturating_duration_since(due) <= max_lag => due,
            _ => now,
        };
        self.next_due = Some(due);
        due
    }

    /// Record that the due padding frame went out.
    pub fn mark_sent(&mut self) {
        if let Some(due) = self.next_due {
            self.next_due = Some(due + self.interval);
        }
    }
}
