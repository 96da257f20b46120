//! blockdl - resumable, block-parallel HTTP downloads
//!
//! A file is split into contiguous byte windows. Each window is fetched by a
//! [`BlockWorker`] on its own thread with an open-ended ranged GET and written
//! at its absolute offset in a shared output file. Workers checkpoint their
//! position into a [`BreakpointStore`] so an interrupted download resumes
//! where every block left off.
//!
//! # Example
//!
//! ```ignore
//! use blockdl::{DownloadConfig, DownloadSession};
//!
//! let session = DownloadSession::new(
//!     "https://example.com/big.iso",
//!     "big.iso",
//!     DownloadConfig::default().with_blocks(8),
//! )?;
//! let report = session.run()?;
//! assert!(report.is_complete());
//! ```

pub mod barrier;
pub mod block;
pub mod cancel;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod http;
pub mod session;

pub use barrier::CompletionBarrier;
pub use block::{
    plan_blocks, BlockListener, BlockOutcome, BlockProgress, BlockRange, BlockStart, BlockWorker,
    NoopListener,
};
pub use cancel::CancellationToken;
pub use checkpoint::{BreakpointStore, CheckpointRecord, CheckpointSink, NoopSink};
pub use config::{ConfigFile, DownloadConfig, HeaderProfile, RetryPolicy};
pub use error::{BlockFailure, DownloadError, DownloadResult, TransportError};
pub use http::{RangeClient, RangeResponse, ReqwestRangeClient};
pub use session::{DownloadListener, DownloadSession, NoopDownloadListener, SessionReport};
