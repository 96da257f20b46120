//! Elapsed-time gate for checkpoint writes.

use std::time::{Duration, Instant};

/// Permits a checkpoint only once `interval` has elapsed since the last one.
///
/// Unlike a UI throttle the first check is not free: the clock starts when the
/// throttle is created, which is when streaming begins.
#[derive(Debug)]
pub struct CheckpointThrottle {
    interval: Duration,
    since: Instant,
}

impl CheckpointThrottle {
    /// Start a throttle with the given minimum interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            since: Instant::now(),
        }
    }

    /// Time since the last checkpoint (or creation).
    pub fn elapsed(&self) -> Duration {
        self.since.elapsed()
    }

    /// Whether a periodic checkpoint is due.
    pub fn is_due(&self) -> bool {
        self.elapsed() >= self.interval
    }

    /// Restart the interval after a checkpoint.
    pub fn reset(&mut self) {
        self.since = Instant::now();
    }

    /// Returns `true` and restarts the interval if a checkpoint is due.
    pub fn poll(&mut self) -> bool {
        if self.is_due() {
            self.reset();
            true
        } else {
            false
        }
    }
}
