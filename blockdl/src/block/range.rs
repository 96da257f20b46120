//! Byte-range model for one block of a download.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::checkpoint::CheckpointRecord;

/// Where a worker starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStart {
    /// Absolute file offset of the next byte to fetch.
    At(u64),
    /// Total size is unknown and must be probed first.
    Unknown,
}

/// Absolute end (exclusive) of block `index`'s window.
///
/// Capped at `total_length` when it is known, which only matters for the
/// last block of a file.
pub fn window_end(block_size: u64, block_index: u32, total_length: Option<u64>) -> u64 {
    let end = block_size.saturating_mul(u64::from(block_index) + 1);
    match total_length {
        Some(total) => end.min(total),
        None => end,
    }
}

/// Percentage of `current` out of `total`, rounded and clamped to `0..=100`.
///
/// An empty total counts as finished.
pub fn compute_percent(total: u64, current: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let current = u128::from(current.min(total));
    let total = u128::from(total);
    ((current * 100 + total / 2) / total) as u8
}

/// Current state of one block.
///
/// Invariant: `start_offset + remaining` is the block's window end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    /// Absolute offset of the next byte to write.
    pub start_offset: u64,
    /// Bytes left before the window end.
    pub remaining: u64,
    /// Nominal block size.
    pub block_size: u64,
    /// Position of the block within the file.
    pub block_index: u32,
}

impl BlockRange {
    /// Range for block `block_index` resuming at absolute `start_offset`.
    pub fn new(block_size: u64, start_offset: u64, block_index: u32, total_length: Option<u64>) -> Self {
        let end = window_end(block_size, block_index, total_length);
        Self {
            start_offset,
            remaining: end.saturating_sub(start_offset),
            block_size,
            block_index,
        }
    }

    /// Rebuild a range from a persisted checkpoint.
    pub fn from_checkpoint(record: &CheckpointRecord) -> Self {
        Self {
            start_offset: record.start_offset,
            remaining: record.remaining,
            block_size: record.block_size,
            block_index: record.block_index,
        }
    }

    /// Absolute start of the block's window.
    pub fn window_start(&self) -> u64 {
        self.block_size.saturating_mul(u64::from(self.block_index))
    }

    /// Absolute end (exclusive) of the block's window.
    pub fn window_end(&self) -> u64 {
        self.start_offset + self.remaining
    }

    /// Length of the window; equals `block_size` except for a capped last block.
    pub fn window_len(&self) -> u64 {
        self.window_end().saturating_sub(self.window_start())
    }

    /// Bytes already on disk for this block.
    pub fn consumed(&self) -> u64 {
        self.window_len().saturating_sub(self.remaining)
    }

    /// Whether no bytes are left to fetch.
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    /// Block progress in percent.
    pub fn percent(&self) -> u8 {
        compute_percent(self.window_len(), self.consumed())
    }

    /// Length of the next read: never zero while bytes remain, never above `chunk`.
    pub fn next_read_len(&self, chunk: usize) -> usize {
        usize::try_from(self.remaining).map_or(chunk, |remaining| remaining.min(chunk))
    }

    /// Record `len` freshly written bytes.
    pub fn advance(&mut self, len: u64) {
        let len = len.min(self.remaining);
        self.start_offset += len;
        self.remaining -= len;
    }

    /// Snapshot for persistence.
    pub fn checkpoint(&self) -> CheckpointRecord {
        CheckpointRecord {
            block_index: self.block_index,
            start_offset: self.start_offset,
            remaining: self.remaining,
            block_size: self.block_size,
        }
    }
}

/// Split `total_length` into at most `blocks` contiguous windows.
///
/// The nominal block size is `ceil(total / blocks)`; the last window is capped
/// at the total length. An empty file yields no blocks.
pub fn plan_blocks(total_length: u64, blocks: usize) -> Vec<BlockRange> {
    if total_length == 0 {
        return Vec::new();
    }
    let requested = (blocks.max(1) as u64).min(total_length);
    let block_size = total_length.div_ceil(requested);
    let count = total_length.div_ceil(block_size);

    (0..count)
        .map(|i| {
            let index = i as u32;
            BlockRange::new(block_size, block_size * i, index, Some(total_length))
        })
        .collect()
}

/// Read-only view of a worker's range, updated while it streams.
///
/// Readers may see the offset and remaining count from adjacent iterations;
/// the value is advisory progress only.
#[derive(Debug, Default)]
pub struct BlockProgress {
    start_offset: AtomicU64,
    remaining: AtomicU64,
    block_size: AtomicU64,
    block_index: AtomicU32,
}

impl BlockProgress {
    /// Progress handle initialised from `range`.
    pub fn new(range: &BlockRange) -> Self {
        let progress = Self::default();
        progress.publish(range);
        progress
    }

    pub(crate) fn publish(&self, range: &BlockRange) {
        self.block_size.store(range.block_size, Ordering::Relaxed);
        self.block_index.store(range.block_index, Ordering::Relaxed);
        self.start_offset.store(range.start_offset, Ordering::Relaxed);
        self.remaining.store(range.remaining, Ordering::Relaxed);
    }

    /// Latest published range.
    pub fn snapshot(&self) -> BlockRange {
        BlockRange {
            start_offset: self.start_offset.load(Ordering::Relaxed),
            remaining: self.remaining.load(Ordering::Relaxed),
            block_size: self.block_size.load(Ordering::Relaxed),
            block_index: self.block_index.load(Ordering::Relaxed),
        }
    }

    /// Latest block percentage.
    pub fn percent(&self) -> u8 {
        self.snapshot().percent()
    }
}
