//! Lifecycle hooks a block worker reports to.

use super::range::BlockRange;
use crate::error::BlockFailure;

/// Observer of one block worker.
///
/// All methods default to no-ops so implementations only override the events
/// they care about. Calls happen synchronously on the worker's thread and must
/// not block.
///
/// Per run the worker emits at most one `on_start` followed by exactly one of
/// `on_block_complete`, `on_error` or `on_cancel`. A run canceled before any
/// I/O, or one that fails before the output file is open, skips `on_start`.
pub trait BlockListener: Send + Sync {
    /// The total size was unknown and has been probed.
    fn on_size_discovered(&self, _total: u64) {}

    /// The output file is open and the block is about to stream.
    fn on_start(&self, _range: &BlockRange) {}

    /// A periodic checkpoint was taken.
    fn on_progress(&self, _range: &BlockRange) {}

    /// The block finished, or was already complete.
    fn on_block_complete(&self, _range: &BlockRange) {}

    /// The block failed; `failure.code()` is the HTTP status or 0.
    fn on_error(&self, _range: &BlockRange, _failure: &BlockFailure) {}

    /// The block stopped because the download was canceled.
    fn on_cancel(&self, _range: &BlockRange) {}
}

/// Listener that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl BlockListener for NoopListener {}
