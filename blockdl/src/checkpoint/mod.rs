//! Breakpoint records and their persistence.
//!
//! A [`CheckpointRecord`] is the minimal state needed to resume one block
//! without re-downloading bytes that are already on disk:
//!
//! - [`CheckpointThrottle`] bounds how often a worker persists while streaming
//! - [`CheckpointSink`] is the persistence seam the worker writes through
//! - [`BreakpointStore`] is a JSON-file sink used by the download session

mod store;
mod throttle;

use serde::{Deserialize, Serialize};

pub use store::BreakpointStore;
pub use throttle::CheckpointThrottle;

/// Resumable progress of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Index of the block within its download.
    pub block_index: u32,
    /// Absolute file offset of the next byte to download.
    pub start_offset: u64,
    /// Bytes still missing from the block window.
    pub remaining: u64,
    /// Nominal block size.
    pub block_size: u64,
}

impl CheckpointRecord {
    /// Whether the block has no bytes left to fetch.
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

/// Destination for block checkpoints.
///
/// Invoked synchronously on the worker thread; implementations own
/// durability and the on-disk format and should not block for long.
pub trait CheckpointSink: Send + Sync {
    /// Persist the latest resumable state of a block.
    fn save_breakpoint(&self, record: &CheckpointRecord);
}

/// Sink that discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl CheckpointSink for NoopSink {
    fn save_breakpoint(&self, _record: &CheckpointRecord) {}
}
