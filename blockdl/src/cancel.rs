//! Cooperative cancellation shared by all workers of one download.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Write-once cancellation flag.
///
/// Cloning yields another handle to the same flag. Once [`cancel`](Self::cancel)
/// is called every clone observes it and the flag never resets. Workers only
/// check it at loop boundaries, so cancellation is never preemptive.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}
