//! The block worker: one byte range, one thread, one file handle.
//!
//! # State machine
//!
//! ```text
//! Created ──► SizeProbe? ──► Opening ──► Streaming ──┬──► Completed
//!                 │              │           │       ├──► Errored
//!                 └──────────────┴───────────┴───────┴──► Canceled
//! ```
//!
//! `SizeProbe` only runs for [`BlockStart::Unknown`]. Whatever path a run
//! takes, the completion barrier (if any) is decremented exactly once when
//! [`BlockWorker::run`] returns or unwinds.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::listener::{BlockListener, NoopListener};
use super::probe::{probe_content_length, Probe};
use super::range::{BlockProgress, BlockRange, BlockStart};
use crate::barrier::{BarrierRelease, CompletionBarrier};
use crate::cancel::CancellationToken;
use crate::checkpoint::{CheckpointSink, CheckpointThrottle, NoopSink};
use crate::config::{
    DownloadConfig, HeaderProfile, RetryPolicy, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_READ_TIMEOUT,
    READ_CHUNK_SIZE,
};
use crate::error::{BlockFailure, DownloadError, DownloadResult, TransportError};
use crate::http::{RangeClient, ReqwestRangeClient, PARTIAL_CONTENT};

/// Write buffer between the response stream and the file.
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Predicate deciding that a block needs no download at all.
pub type CompletionCheck = Box<dyn Fn(&BlockRange) -> bool + Send + Sync>;

/// Terminal outcome of one worker run.
#[derive(Debug)]
pub enum BlockOutcome {
    /// All bytes of the window are on disk (or the stream ended).
    Completed(BlockRange),
    /// The block failed and was not retried.
    Failed(BlockRange, BlockFailure),
    /// The download was canceled.
    Canceled(BlockRange),
}

impl BlockOutcome {
    /// Range at the time the worker stopped.
    pub fn range(&self) -> &BlockRange {
        match self {
            Self::Completed(range) | Self::Failed(range, _) | Self::Canceled(range) => range,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }

    /// Listener error code for a failed block.
    pub fn error_code(&self) -> Option<u16> {
        match self {
            Self::Failed(_, failure) => Some(failure.code()),
            _ => None,
        }
    }
}

enum StreamEnd {
    Finished,
    Canceled,
    Failed(BlockFailure),
}

/// Downloads one block of a file with a ranged GET.
pub struct BlockWorker {
    url: String,
    output: PathBuf,
    start: BlockStart,
    block_size: u64,
    block_index: u32,
    client: Option<Arc<dyn RangeClient>>,
    read_timeout: Duration,
    headers: HeaderProfile,
    listener: Arc<dyn BlockListener>,
    sink: Arc<dyn CheckpointSink>,
    token: CancellationToken,
    barrier: Option<Arc<CompletionBarrier>>,
    completion_check: Option<CompletionCheck>,
    probe_retry: RetryPolicy,
    checkpoint_interval: Duration,
    progress: Arc<BlockProgress>,
}

impl std::fmt::Debug for BlockWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockWorker")
            .field("url", &self.url)
            .field("output", &self.output)
            .field("start", &self.start)
            .field("block_size", &self.block_size)
            .field("block_index", &self.block_index)
            .finish_non_exhaustive()
    }
}

impl BlockWorker {
    /// Create a worker for block `block_index` of `url`, written into `output`.
    ///
    /// `start` is the absolute offset to resume from, or [`BlockStart::Unknown`]
    /// when the total size must be probed first. Arguments that can never
    /// produce a valid download are rejected here rather than mid-stream.
    pub fn new(
        url: impl Into<String>,
        block_size: u64,
        start: BlockStart,
        block_index: u32,
        output: impl Into<PathBuf>,
    ) -> DownloadResult<Self> {
        let url = url.into();
        let output = output.into();

        if url.trim().is_empty() {
            return Err(DownloadError::Config("block URL is empty".to_string()));
        }
        if output.as_os_str().is_empty() {
            return Err(DownloadError::Config("output path is empty".to_string()));
        }
        if start == BlockStart::Unknown && block_index != 0 {
            return Err(DownloadError::Config(format!(
                "block {} has an unknown start; only block 0 can probe the size",
                block_index
            )));
        }
        if matches!(start, BlockStart::At(_)) && block_size == 0 {
            return Err(DownloadError::Config(format!(
                "block {} has a known start but zero block size",
                block_index
            )));
        }

        let initial = match start {
            BlockStart::At(offset) => BlockRange::new(block_size, offset, block_index, None),
            BlockStart::Unknown => BlockRange {
                start_offset: 0,
                remaining: 0,
                block_size: 0,
                block_index,
            },
        };

        Ok(Self {
            url,
            output,
            start,
            block_size,
            block_index,
            client: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            headers: HeaderProfile::default(),
            listener: Arc::new(NoopListener),
            sink: Arc::new(NoopSink),
            token: CancellationToken::new(),
            barrier: None,
            completion_check: None,
            probe_retry: RetryPolicy::default(),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            progress: Arc::new(BlockProgress::new(&initial)),
        })
    }

    /// Use a specific transport instead of a default reqwest client.
    pub fn with_client(mut self, client: Arc<dyn RangeClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Report lifecycle events to `listener`.
    pub fn with_listener(mut self, listener: Arc<dyn BlockListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Persist checkpoints through `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn CheckpointSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Share a download-wide cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Decrement `barrier` once when the run ends.
    pub fn with_barrier(mut self, barrier: Arc<CompletionBarrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    /// Skip the download when `check` reports the block as done.
    pub fn with_completion_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&BlockRange) -> bool + Send + Sync + 'static,
    {
        self.completion_check = Some(Box::new(check));
        self
    }

    /// Cap the last block's window at the file's total length.
    pub fn with_total_length(self, total_length: u64) -> Self {
        if let BlockStart::At(offset) = self.start {
            let range = BlockRange::new(self.block_size, offset, self.block_index, Some(total_length));
            self.progress.publish(&range);
        }
        self
    }

    /// Override the size probe retry policy.
    pub fn with_probe_retry(mut self, policy: RetryPolicy) -> Self {
        self.probe_retry = policy;
        self
    }

    /// Override the minimum interval between periodic checkpoints.
    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Apply timeouts, headers, retry policy and checkpoint interval from `config`.
    pub fn with_config(mut self, config: &DownloadConfig) -> Self {
        self.read_timeout = config.read_timeout;
        self.headers = config.headers.clone();
        self.probe_retry = config.probe_retry.clone();
        self.checkpoint_interval = config.checkpoint_interval;
        self
    }

    /// Handle for reading block progress while the worker runs.
    pub fn progress(&self) -> Arc<BlockProgress> {
        Arc::clone(&self.progress)
    }

    /// Block percentage, safe to call from any thread via [`progress`](Self::progress).
    pub fn block_percent(&self) -> u8 {
        self.progress.percent()
    }

    /// Cancel the download this worker belongs to.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.token.is_canceled()
    }

    pub fn block_index(&self) -> u32 {
        self.block_index
    }

    /// Run the block to a terminal outcome.
    ///
    /// Consumes the worker so a barrier can only ever be released once.
    pub fn run(self) -> BlockOutcome {
        let _release = BarrierRelease::new(self.barrier.clone());
        let outcome = self.execute();
        debug!(
            block = self.block_index,
            completed = outcome.is_completed(),
            canceled = outcome.is_canceled(),
            "Block worker finished"
        );
        outcome
    }

    fn execute(&self) -> BlockOutcome {
        let mut range = self.progress.snapshot();

        if self.token.is_canceled() {
            self.listener.on_cancel(&range);
            return BlockOutcome::Canceled(range);
        }

        let client = match self.client() {
            Ok(client) => client,
            Err(e) => return self.fail(range, e.into()),
        };

        if self.start == BlockStart::Unknown {
            match probe_content_length(client.as_ref(), &self.url, &self.probe_retry, &self.token) {
                Probe::Found(total) => {
                    info!(url = %self.url, total, "Discovered content length");
                    range = BlockRange::new(total, 0, self.block_index, Some(total));
                    self.progress.publish(&range);
                    self.listener.on_size_discovered(total);
                }
                Probe::Canceled => {
                    self.listener.on_cancel(&range);
                    return BlockOutcome::Canceled(range);
                }
                Probe::Exhausted(failure) => return self.fail(range, failure),
            }
        }

        let file = match open_output(&self.output, range.start_offset) {
            Ok(file) => file,
            Err(failure) => return self.fail(range, failure),
        };

        self.listener.on_start(&range);

        if self.is_already_complete(&range) {
            info!(block = range.block_index, "Block already complete, skipping");
            self.listener.on_block_complete(&range);
            return BlockOutcome::Completed(range);
        }

        let response = match client.get_from(&self.url, range.start_offset) {
            Ok(response) => response,
            Err(e) => return self.fail(range, e.into()),
        };
        if response.status != PARTIAL_CONTENT {
            return self.fail(range, BlockFailure::Protocol { status: response.status });
        }

        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        match self.stream(response.body, &mut writer, &mut range) {
            StreamEnd::Finished => {
                if let Err(e) = writer.flush() {
                    return self.fail(range, BlockFailure::Write(e));
                }
                self.checkpoint(&range);
                self.listener.on_block_complete(&range);
                BlockOutcome::Completed(range)
            }
            StreamEnd::Canceled => {
                self.finish_canceled(&mut writer, &range);
                BlockOutcome::Canceled(range)
            }
            StreamEnd::Failed(failure) => {
                if self.token.is_canceled() {
                    self.finish_canceled(&mut writer, &range);
                    return BlockOutcome::Canceled(range);
                }
                if writer.flush().is_ok() {
                    self.checkpoint(&range);
                }
                self.fail(range, failure)
            }
        }
    }

    fn client(&self) -> Result<Arc<dyn RangeClient>, TransportError> {
        match &self.client {
            Some(client) => Ok(Arc::clone(client)),
            None => {
                let client = ReqwestRangeClient::with_settings(self.read_timeout, self.headers.clone())?;
                Ok(Arc::new(client))
            }
        }
    }

    fn is_already_complete(&self, range: &BlockRange) -> bool {
        range.is_complete() || self.completion_check.as_ref().is_some_and(|check| check(range))
    }

    fn stream(
        &self,
        mut body: Box<dyn Read + Send>,
        writer: &mut BufWriter<File>,
        range: &mut BlockRange,
    ) -> StreamEnd {
        let mut buffer = [0u8; READ_CHUNK_SIZE];
        let mut throttle = CheckpointThrottle::new(self.checkpoint_interval);

        while !range.is_complete() {
            let want = range.next_read_len(READ_CHUNK_SIZE);
            let read = match body.read(&mut buffer[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return StreamEnd::Failed(TransportError::Read(e.to_string()).into()),
            };

            if let Err(e) = writer.write_all(&buffer[..read]) {
                return StreamEnd::Failed(BlockFailure::Write(e));
            }
            range.advance(read as u64);
            self.progress.publish(range);

            if throttle.poll() {
                if let Err(e) = writer.flush() {
                    return StreamEnd::Failed(BlockFailure::Write(e));
                }
                self.checkpoint(range);
                self.listener.on_progress(range);
            }

            if self.token.is_canceled() {
                return StreamEnd::Canceled;
            }
        }

        StreamEnd::Finished
    }

    fn finish_canceled(&self, writer: &mut BufWriter<File>, range: &BlockRange) {
        // Unflushed bytes must not be claimed by a checkpoint; the previous one stays valid.
        match writer.flush() {
            Ok(()) => self.checkpoint(range),
            Err(e) => warn!(block = range.block_index, error = %e, "Flush failed on cancel"),
        }
        info!(
            block = range.block_index,
            offset = range.start_offset,
            remaining = range.remaining,
            "Block canceled"
        );
        self.listener.on_cancel(range);
    }

    fn checkpoint(&self, range: &BlockRange) {
        self.sink.save_breakpoint(&range.checkpoint());
    }

    fn fail(&self, range: BlockRange, failure: BlockFailure) -> BlockOutcome {
        warn!(
            block = range.block_index,
            url = %self.url,
            code = failure.code(),
            error = %failure,
            "Block failed"
        );
        self.listener.on_error(&range, &failure);
        BlockOutcome::Failed(range, failure)
    }
}

fn open_output(path: &Path, offset: u64) -> Result<File, BlockFailure> {
    let open_failure = |source| BlockFailure::FileOpen {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(open_failure)?;
    file.seek(SeekFrom::Start(offset)).map_err(open_failure)?;
    Ok(file)
}
