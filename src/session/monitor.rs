//! Session duration limit.

use std::time::Duration;

/// Result of one monitor tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No running session; nothing to report.
    Idle,
    /// Whole seconds left, floored.
    Running { remaining: u64 },
    /// Limit strictly exceeded; the session must be stopped.
    Expired,
}

/// Checks elapsed session time against the server's limit.
///
/// A session may run *at* the limit for one more tick: only an elapsed time
/// strictly greater than `max_duration` expires it.
#[derive(Debug, Clone, Copy)]
pub struct DurationMonitor {
    max_duration: Duration,
}

impl DurationMonitor {
    pub fn new(max_duration: Duration) -> Self {
        Self { max_duration }
    }

    pub fn check(&self, elapsed: Option<Duration>) -> Verdict {
        let Some(elapsed) = elapsed else {
            return Verdict::Idle;
        };
        if elapsed > self.max_duration {
            return Verdict::Expired;
        }
        Verdict::Running {
            remaining: self.max_duration.saturating_sub(elapsed).as_secs(),
        }
    }

    /// Value displayed when no session is running.
    pub fn full_seconds(&self) -> u64 {
        self.max_duration.as_secs()
    }
}
