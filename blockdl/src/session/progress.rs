//! Progress aggregation across block workers.
//!
//! Workers publish their ranges into [`BlockProgress`] handles; a
//! [`ProgressReporter`] thread polls them and forwards totals to the
//! download listener.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::listener::DownloadListener;
use crate::block::BlockProgress;

/// Default interval between progress reports.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Shared counters for one download.
#[derive(Debug)]
pub struct ProgressCounters {
    blocks: Vec<Arc<BlockProgress>>,
    total_bytes: AtomicU64,
    blocks_completed: AtomicUsize,
    done: AtomicBool,
}

impl ProgressCounters {
    /// Counters over the given block handles.
    pub fn new(blocks: Vec<Arc<BlockProgress>>, total_bytes: u64) -> Self {
        Self {
            blocks,
            total_bytes: AtomicU64::new(total_bytes),
            blocks_completed: AtomicUsize::new(0),
            done: AtomicBool::new(false),
        }
    }

    /// Bytes on disk across all blocks.
    pub fn downloaded_bytes(&self) -> u64 {
        self.blocks.iter().map(|b| b.snapshot().consumed()).sum()
    }

    /// Expected total size in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::SeqCst)
    }

    /// Update the total once an unknown size has been discovered.
    pub fn set_total_bytes(&self, total: u64) {
        self.total_bytes.store(total, Ordering::SeqCst);
    }

    pub fn completed_blocks(&self) -> usize {
        self.blocks_completed.load(Ordering::SeqCst)
    }

    pub fn mark_completed(&self) {
        self.blocks_completed.fetch_add(1, Ordering::SeqCst);
    }

    /// Signal the reporter to stop.
    pub fn signal_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// Background thread forwarding progress to a [`DownloadListener`].
///
/// Dropping the reporter stops the thread after one final report.
pub struct ProgressReporter {
    handle: Option<JoinHandle<()>>,
    counters: Arc<ProgressCounters>,
}

impl ProgressReporter {
    /// Start reporting every `poll_interval`.
    pub fn start(
        id: u64,
        counters: Arc<ProgressCounters>,
        listener: Arc<dyn DownloadListener>,
        poll_interval: Duration,
    ) -> Self {
        let counters_clone = Arc::clone(&counters);

        let handle = thread::spawn(move || {
            while !counters_clone.is_done() {
                listener.on_progress(id, counters_clone.total_bytes(), counters_clone.downloaded_bytes());
                thread::sleep(poll_interval);
            }

            // Final report
            listener.on_progress(id, counters_clone.total_bytes(), counters_clone.downloaded_bytes());
        });

        Self {
            handle: Some(handle),
            counters,
        }
    }

    /// Start a reporter with the default 100ms interval.
    pub fn start_default(
        id: u64,
        counters: Arc<ProgressCounters>,
        listener: Arc<dyn DownloadListener>,
    ) -> Self {
        Self::start(id, counters, listener, DEFAULT_REPORT_INTERVAL)
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.counters.signal_done();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}
