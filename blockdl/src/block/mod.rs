//! Per-block downloading.
//!
//! A download is split into contiguous byte windows, one per
//! [`BlockWorker`]. Each worker:
//! - probes the total size when it is unknown (`BlockStart::Unknown`)
//! - opens its own handle on the shared output file at its offset
//! - streams a `Range: bytes=<offset>-` response in reads of at most 512 bytes
//! - checkpoints through a [`CheckpointSink`](crate::checkpoint::CheckpointSink)
//! - reports to a [`BlockListener`] and releases the completion barrier once
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use blockdl::block::{BlockStart, BlockWorker};
//! use blockdl::{CancellationToken, CompletionBarrier};
//!
//! let token = CancellationToken::new();
//! let barrier = Arc::new(CompletionBarrier::new(1));
//!
//! let worker = BlockWorker::new("https://example.com/big.iso", 1 << 20, BlockStart::At(0), 0, "big.iso")?
//!     .with_cancellation(token.clone())
//!     .with_barrier(Arc::clone(&barrier));
//!
//! std::thread::spawn(move || worker.run());
//! barrier.wait();
//! ```

mod listener;
mod probe;
mod range;
mod worker;

pub use listener::{BlockListener, NoopListener};
pub use probe::{probe_content_length, Probe};
pub use range::{compute_percent, plan_blocks, window_end, BlockProgress, BlockRange, BlockStart};
pub use worker::{BlockOutcome, BlockWorker, CompletionCheck};
