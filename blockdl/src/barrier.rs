//! Countdown barrier the download owner waits on.
//!
//! Each block worker holds a [`BarrierRelease`] for the duration of its run.
//! Dropping the release decrements the barrier, so the decrement happens exactly
//! once per worker on every exit path, including unwinding.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Countdown latch initialised to the number of workers.
#[derive(Debug)]
pub struct CompletionBarrier {
    count: Mutex<usize>,
    zero: Condvar,
}

impl CompletionBarrier {
    /// Create a barrier expecting `count` decrements.
    pub fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            zero: Condvar::new(),
        }
    }

    /// Decrement the counter, waking waiters when it reaches zero.
    ///
    /// Extra decrements past zero are ignored.
    pub fn count_down(&self) {
        let mut count = self.count.lock();
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    /// Current counter value.
    pub fn count(&self) -> usize {
        *self.count.lock()
    }

    /// Block until the counter reaches zero.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.zero.wait(&mut count);
        }
    }

    /// Block until the counter reaches zero or `timeout` elapses.
    ///
    /// Returns `true` if the counter reached zero.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count > 0 {
            if self.zero.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

/// Decrements a shared barrier once when dropped.
#[derive(Debug)]
pub(crate) struct BarrierRelease(Option<Arc<CompletionBarrier>>);

impl BarrierRelease {
    pub(crate) fn new(barrier: Option<Arc<CompletionBarrier>>) -> Self {
        Self(barrier)
    }
}

impl Drop for BarrierRelease {
    fn drop(&mut self) {
        if let Some(barrier) = self.0.take() {
            barrier.count_down();
        }
    }
}
