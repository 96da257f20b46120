//! Single-URL download session.
//!
//! A [`DownloadSession`] is the owner the block workers report to:
//!
//! ```text
//! DownloadSession
//!     │
//!     ├── probe total length ──► plan_blocks / BreakpointStore (resume)
//!     │
//!     ├── BlockWorker × N (one thread each, shared token + barrier)
//!     │       └── BreakpointStore (checkpoint sink)
//!     │
//!     ├── ProgressReporter ──► DownloadListener::on_progress
//!     │
//!     └── CompletionBarrier::wait ──► SessionReport
//! ```
//!
//! A session that is canceled or has failing blocks leaves its breakpoint
//! store behind; running it again resumes every block from its last
//! checkpoint. A completed session removes the store.

mod listener;
mod progress;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::barrier::CompletionBarrier;
use crate::block::{
    plan_blocks, probe_content_length, BlockListener, BlockOutcome, BlockProgress, BlockRange,
    BlockStart, BlockWorker, Probe,
};
use crate::cancel::CancellationToken;
use crate::checkpoint::{BreakpointStore, CheckpointRecord, CheckpointSink, NoopSink};
use crate::config::{DownloadConfig, RetryPolicy};
use crate::error::{DownloadError, DownloadResult};
use crate::http::{RangeClient, ReqwestRangeClient};

pub use listener::{DownloadListener, NoopDownloadListener};
pub use progress::{ProgressCounters, ProgressReporter, DEFAULT_REPORT_INTERVAL};

/// Summary of one session run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Total file length, if it could be determined.
    pub total_length: Option<u64>,
    /// Number of blocks in the plan.
    pub blocks: usize,
    /// Blocks that are fully downloaded.
    pub completed: usize,
    /// `(block index, error code)` for every failed block.
    pub failed: Vec<(u32, u16)>,
    /// Whether the session was canceled.
    pub canceled: bool,
    /// Bytes on disk at the end of the run.
    pub downloaded_bytes: u64,
}

impl SessionReport {
    /// Whether every block completed.
    pub fn is_complete(&self) -> bool {
        !self.canceled && self.failed.is_empty() && self.completed == self.blocks
    }
}

/// Bridges block events into the session counters.
struct SessionEvents {
    counters: Arc<ProgressCounters>,
}

impl BlockListener for SessionEvents {
    fn on_size_discovered(&self, total: u64) {
        self.counters.set_total_bytes(total);
    }

    fn on_block_complete(&self, range: &BlockRange) {
        debug!(block = range.block_index, "Block complete");
        self.counters.mark_completed();
    }
}

/// Downloads one URL into one file with resumable parallel blocks.
pub struct DownloadSession {
    id: u64,
    url: String,
    output: PathBuf,
    config: DownloadConfig,
    client: Arc<dyn RangeClient>,
    listener: Arc<dyn DownloadListener>,
    token: CancellationToken,
}

impl DownloadSession {
    /// Create a session using a reqwest transport built from `config`.
    pub fn new(
        url: impl Into<String>,
        output: impl Into<PathBuf>,
        config: DownloadConfig,
    ) -> DownloadResult<Self> {
        let client = ReqwestRangeClient::with_settings(config.read_timeout, config.headers.clone())?;
        Ok(Self::with_client(url, output, config, Arc::new(client)))
    }

    /// Create a session over a custom transport.
    pub fn with_client(
        url: impl Into<String>,
        output: impl Into<PathBuf>,
        config: DownloadConfig,
        client: Arc<dyn RangeClient>,
    ) -> Self {
        Self {
            id: 0,
            url: url.into(),
            output: output.into(),
            config,
            client,
            listener: Arc::new(NoopDownloadListener),
            token: CancellationToken::new(),
        }
    }

    /// Task id passed to the listener.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Report download-wide events to `listener`.
    pub fn with_listener(mut self, listener: Arc<dyn DownloadListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Share an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Token shared by every worker of this session.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the running download.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Run the download to completion, failure or cancellation.
    ///
    /// Block-level failures are reported in the returned [`SessionReport`];
    /// an `Err` means the session could not be set up at all.
    pub fn run(&self) -> DownloadResult<SessionReport> {
        if self.url.trim().is_empty() {
            return Err(DownloadError::Config("download URL is empty".to_string()));
        }

        // One quick probe; an unknown size is left to a single worker with the full retry budget.
        let failure = match probe_content_length(
            self.client.as_ref(),
            &self.url,
            &RetryPolicy::no_retry(),
            &self.token,
        ) {
            Probe::Found(total) => return self.run_planned(total),
            Probe::Canceled => return Ok(self.canceled_before_start()),
            Probe::Exhausted(failure) => failure,
        };

        // Breakpoints need a known length; retry the probe before abandoning them.
        if let Some(store) = self.resumable_store() {
            info!(url = %self.url, error = %failure, "Size probe failed, retrying to resume from breakpoints");
            return match probe_content_length(
                self.client.as_ref(),
                &self.url,
                &self.config.probe_retry,
                &self.token,
            ) {
                Probe::Found(total) => self.run_planned(total),
                Probe::Canceled => Ok(self.canceled_before_start()),
                Probe::Exhausted(failure) => Ok(self.resume_unavailable(&store, failure.code())),
            };
        }

        info!(url = %self.url, error = %failure, "Content length unknown, using a single block");
        self.run_unknown_size()
    }

    fn canceled_before_start(&self) -> SessionReport {
        self.listener.on_cancel(self.id);
        SessionReport {
            total_length: None,
            blocks: 0,
            completed: 0,
            failed: Vec::new(),
            canceled: true,
            downloaded_bytes: 0,
        }
    }

    /// Breakpoint store left by an earlier run of this same download.
    fn resumable_store(&self) -> Option<BreakpointStore> {
        let path = BreakpointStore::path_for(&self.output);
        match BreakpointStore::open(&path) {
            Ok(Some(store))
                if store.url() == self.url && !store.records().is_empty() && self.output.exists() =>
            {
                Some(store)
            }
            _ => None,
        }
    }

    /// Report a failed run that left the output and its breakpoints untouched.
    fn resume_unavailable(&self, store: &BreakpointStore, code: u16) -> SessionReport {
        let records = store.records();
        let total = store.total_length();
        let report = SessionReport {
            total_length: Some(total),
            blocks: records.len(),
            completed: records.iter().filter(|r| r.is_complete()).count(),
            failed: vec![(0, code)],
            canceled: false,
            downloaded_bytes: total.saturating_sub(store.remaining_bytes()),
        };
        self.notify_finished(&report);
        report
    }

    fn run_planned(&self, total: u64) -> DownloadResult<SessionReport> {
        let store_path = BreakpointStore::path_for(&self.output);
        let (store, resumed) = self.open_or_create_store(&store_path, total)?;
        let store = Arc::new(store);
        let ranges: Vec<BlockRange> = store.records().iter().map(BlockRange::from_checkpoint).collect();

        prepare_output(&self.output, total, resumed)?;

        if ranges.is_empty() {
            store.remove()?;
            self.listener.on_start(self.id, 0, 0);
            self.listener.on_complete(self.id);
            return Ok(SessionReport {
                total_length: Some(0),
                blocks: 0,
                completed: 0,
                failed: Vec::new(),
                canceled: false,
                downloaded_bytes: 0,
            });
        }

        info!(
            url = %self.url,
            output = %self.output.display(),
            total,
            blocks = ranges.len(),
            resumed,
            "Starting download"
        );

        let sink: Arc<dyn CheckpointSink> = store.clone();
        let barrier = Arc::new(CompletionBarrier::new(
            ranges.iter().filter(|r| !r.is_complete()).count(),
        ));

        let mut handles = Vec::with_capacity(ranges.len());
        let mut workers = Vec::new();
        for range in &ranges {
            if range.is_complete() {
                handles.push(Arc::new(BlockProgress::new(range)));
                continue;
            }
            let store_for_check = Arc::clone(&store);
            let worker = BlockWorker::new(
                self.url.clone(),
                range.block_size,
                BlockStart::At(range.start_offset),
                range.block_index,
                self.output.clone(),
            )?
            .with_total_length(total)
            .with_config(&self.config)
            .with_client(Arc::clone(&self.client))
            .with_sink(Arc::clone(&sink))
            .with_cancellation(self.token.clone())
            .with_barrier(Arc::clone(&barrier))
            .with_completion_check(move |r| {
                store_for_check
                    .record(r.block_index)
                    .is_some_and(|c| c.is_complete())
            });
            handles.push(worker.progress());
            workers.push(worker);
        }

        let counters = Arc::new(ProgressCounters::new(handles, total));
        for _ in 0..ranges.len() - workers.len() {
            counters.mark_completed();
        }
        let events: Arc<dyn BlockListener> = Arc::new(SessionEvents {
            counters: Arc::clone(&counters),
        });
        let workers: Vec<BlockWorker> = workers
            .into_iter()
            .map(|w| w.with_listener(Arc::clone(&events)))
            .collect();

        self.listener.on_start(self.id, total, counters.downloaded_bytes());

        let outcomes = {
            let _reporter = ProgressReporter::start_default(
                self.id,
                Arc::clone(&counters),
                Arc::clone(&self.listener),
            );
            let joins = spawn_workers(workers);
            barrier.wait();
            collect_outcomes(joins)
        };

        if let Err(e) = store.persist() {
            warn!(error = %e, "Failed to persist breakpoint store");
        }

        let report = self.build_report(Some(total), ranges.len(), &counters, &outcomes);
        if report.is_complete() {
            store.remove()?;
        }
        self.notify_finished(&report);
        Ok(report)
    }

    fn run_unknown_size(&self) -> DownloadResult<SessionReport> {
        // Without a length there is no plan to resume against; stale breakpoints
        // would describe bytes the truncation below throws away.
        BreakpointStore::discard(&BreakpointStore::path_for(&self.output))?;
        prepare_output(&self.output, 0, false)?;
        let worker = BlockWorker::new(self.url.clone(), 0, BlockStart::Unknown, 0, self.output.clone())?
            .with_config(&self.config)
            .with_client(Arc::clone(&self.client))
            .with_sink(Arc::new(NoopSink))
            .with_cancellation(self.token.clone());
        let counters = Arc::new(ProgressCounters::new(vec![worker.progress()], 0));
        let worker = worker.with_listener(Arc::new(SessionEvents {
            counters: Arc::clone(&counters),
        }));

        self.listener.on_start(self.id, 0, 0);
        let outcome = {
            let _reporter = ProgressReporter::start_default(
                self.id,
                Arc::clone(&counters),
                Arc::clone(&self.listener),
            );
            worker.run()
        };

        let discovered = outcome.is_completed() || outcome.range().block_size > 0;
        let total = discovered.then(|| counters.total_bytes());
        let report = self.build_report(total, 1, &counters, &[(0, Some(outcome))]);
        self.notify_finished(&report);
        Ok(report)
    }

    fn open_or_create_store(&self, path: &Path, total: u64) -> DownloadResult<(BreakpointStore, bool)> {
        match BreakpointStore::open(path) {
            Ok(Some(store)) if store.matches(&self.url, total) && self.output.exists() => {
                info!(
                    store = %path.display(),
                    remaining = store.remaining_bytes(),
                    "Resuming from breakpoints"
                );
                return Ok((store, true));
            }
            Ok(Some(_)) => warn!(store = %path.display(), "Breakpoint store does not match download, starting over"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ignoring unreadable breakpoint store"),
        }

        let plan = plan_blocks(total, self.config.blocks);
        let block_size = plan.first().map_or(0, |r| r.block_size);
        let records: Vec<CheckpointRecord> = plan.iter().map(BlockRange::checkpoint).collect();
        let store = BreakpointStore::create(path.to_path_buf(), &self.url, total, block_size, records)?;
        Ok((store, false))
    }

    fn build_report(
        &self,
        total_length: Option<u64>,
        blocks: usize,
        counters: &ProgressCounters,
        outcomes: &[(u32, Option<BlockOutcome>)],
    ) -> SessionReport {
        let mut failed = Vec::new();
        let mut canceled = self.token.is_canceled();
        for (index, outcome) in outcomes {
            match outcome {
                Some(BlockOutcome::Failed(_, failure)) => failed.push((*index, failure.code())),
                Some(BlockOutcome::Canceled(_)) => canceled = true,
                // The stream ended early; keep the store so the gap is fetched next run.
                Some(BlockOutcome::Completed(range)) if range.remaining > 0 => {
                    warn!(block = index, remaining = range.remaining, "Block stream ended short");
                    failed.push((*index, 0));
                }
                Some(BlockOutcome::Completed(_)) => {}
                // The worker thread panicked.
                None => failed.push((*index, 0)),
            }
        }

        SessionReport {
            total_length,
            blocks,
            completed: counters.completed_blocks(),
            failed,
            canceled,
            downloaded_bytes: counters.downloaded_bytes(),
        }
    }

    fn notify_finished(&self, report: &SessionReport) {
        if report.canceled {
            info!(url = %self.url, downloaded = report.downloaded_bytes, "Download canceled");
            self.listener.on_cancel(self.id);
        } else if let Some((block, code)) = report.failed.first() {
            warn!(url = %self.url, block, code, failed = report.failed.len(), "Download failed");
            self.listener.on_error(self.id, *code);
        } else {
            info!(url = %self.url, bytes = report.downloaded_bytes, "Download complete");
            self.listener.on_complete(self.id);
        }
    }
}

fn spawn_workers(workers: Vec<BlockWorker>) -> Vec<(u32, JoinHandle<BlockOutcome>)> {
    workers
        .into_iter()
        .map(|worker| (worker.block_index(), thread::spawn(move || worker.run())))
        .collect()
}

fn collect_outcomes(joins: Vec<(u32, JoinHandle<BlockOutcome>)>) -> Vec<(u32, Option<BlockOutcome>)> {
    joins
        .into_iter()
        .map(|(index, join)| (index, join.join().ok()))
        .collect()
}

/// Create the output file and size it to `total`.
///
/// A fresh plan truncates whatever was there before.
fn prepare_output(path: &Path, total: u64, resumed: bool) -> DownloadResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| DownloadError::WriteFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(!resumed)
        .open(path)
        .map_err(|e| DownloadError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    file.set_len(total).map_err(|e| DownloadError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::http::{RangeResponse, PARTIAL_CONTENT};
    use parking_lot::Mutex;
    use std::io::{self, Cursor, Read};
    use std::time::Duration;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// In-memory server that honours open-ended ranges.
    struct MemoryServer {
        data: Vec<u8>,
        advertise_length: bool,
        /// Length reported by the probe when it differs from the body.
        claimed_length: Option<u64>,
        /// Probes answered with an error before the length is reported.
        probe_failures: Mutex<usize>,
        status: u16,
        requests: Mutex<Vec<u64>>,
        cancel_after: Option<(u64, CancellationToken)>,
    }

    impl MemoryServer {
        fn new(data: Vec<u8>) -> Self {
            Self {
                data,
                advertise_length: true,
                claimed_length: None,
                probe_failures: Mutex::new(0),
                status: PARTIAL_CONTENT,
                requests: Mutex::new(Vec::new()),
                cancel_after: None,
            }
        }

        fn failing_probes(self, count: usize) -> Self {
            *self.probe_failures.lock() = count;
            self
        }

        fn requested_offsets(&self) -> Vec<u64> {
            let mut offsets = self.requests.lock().clone();
            offsets.sort_unstable();
            offsets
        }
    }

    /// Body that trips a token once `limit` bytes have been served.
    struct TrippingBody {
        inner: Cursor<Vec<u8>>,
        served: u64,
        limit: u64,
        token: CancellationToken,
    }

    impl Read for TrippingBody {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.inner.read(buf)?;
            self.served += n as u64;
            if self.served >= self.limit {
                self.token.cancel();
            }
            Ok(n)
        }
    }

    impl RangeClient for MemoryServer {
        fn content_length(&self, url: &str) -> Result<u64, TransportError> {
            let mut failures = self.probe_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(TransportError::Request {
                    url: url.to_string(),
                    reason: "connection reset".to_string(),
                });
            }
            if self.advertise_length {
                Ok(self.claimed_length.unwrap_or(self.data.len() as u64))
            } else {
                Err(TransportError::MissingLength { url: url.to_string() })
            }
        }

        fn get_from(&self, _url: &str, offset: u64) -> Result<RangeResponse, TransportError> {
            self.requests.lock().push(offset);
            let tail = self.data[offset as usize..].to_vec();
            let body: Box<dyn Read + Send> = match &self.cancel_after {
                Some((limit, token)) => Box::new(TrippingBody {
                    inner: Cursor::new(tail),
                    served: 0,
                    limit: *limit,
                    token: token.clone(),
                }),
                None => Box::new(Cursor::new(tail)),
            };
            Ok(RangeResponse {
                status: self.status,
                body,
            })
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<String>>,
    }

    impl RecordingListener {
        fn terminal(&self) -> Vec<String> {
            self.events
                .lock()
                .iter()
                .filter(|e| !e.starts_with("progress"))
                .cloned()
                .collect()
        }

        fn last_progress(&self) -> Option<String> {
            self.events
                .lock()
                .iter()
                .rev()
                .find(|e| e.starts_with("progress"))
                .cloned()
        }
    }

    impl DownloadListener for RecordingListener {
        fn on_start(&self, id: u64, total: u64, current: u64) {
            self.events.lock().push(format!("start {} {} {}", id, total, current));
        }

        fn on_progress(&self, _id: u64, total: u64, current: u64) {
            self.events.lock().push(format!("progress {} {}", total, current));
        }

        fn on_complete(&self, id: u64) {
            self.events.lock().push(format!("complete {}", id));
        }

        fn on_error(&self, id: u64, code: u16) {
            self.events.lock().push(format!("error {} {}", id, code));
        }

        fn on_cancel(&self, id: u64) {
            self.events.lock().push(format!("cancel {}", id));
        }
    }

    fn test_config(blocks: usize) -> DownloadConfig {
        DownloadConfig::default()
            .with_blocks(blocks)
            .with_checkpoint_interval(Duration::ZERO)
            .with_probe_retry(RetryPolicy::no_retry())
    }

    #[test]
    fn test_multi_block_download() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("file.bin");
        let data = payload(10_000);
        let server = Arc::new(MemoryServer::new(data.clone()));
        let listener = Arc::new(RecordingListener::default());

        let session = DownloadSession::with_client("http://example.com/file.bin", &output, test_config(4), server.clone())
            .with_id(7)
            .with_listener(listener.clone());
        let report = session.run().unwrap();

        assert!(report.is_complete());
        assert_eq!(report.blocks, 4);
        assert_eq!(report.completed, 4);
        assert_eq!(report.total_length, Some(10_000));
        assert_eq!(report.downloaded_bytes, 10_000);
        assert_eq!(std::fs::read(&output).unwrap(), data);
        assert_eq!(server.requested_offsets(), vec![0, 2500, 5000, 7500]);
        assert!(!BreakpointStore::path_for(&output).exists());

        assert_eq!(listener.terminal(), vec!["start 7 10000 0", "complete 7"]);
        assert_eq!(listener.last_progress().as_deref(), Some("progress 10000 10000"));
    }

    #[test]
    fn test_cancel_then_resume() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("resume.bin");
        let url = "http://example.com/resume.bin";
        let data = payload(8_192);

        let token = CancellationToken::new();
        let mut server = MemoryServer::new(data.clone());
        server.cancel_after = Some((1_024, token.clone()));
        let first = DownloadSession::with_client(url, &output, test_config(2), Arc::new(server))
            .with_cancellation(token)
            .run()
            .unwrap();
        assert!(first.canceled);
        assert!(!first.is_complete());

        let store = BreakpointStore::open(&BreakpointStore::path_for(&output))
            .unwrap()
            .unwrap();
        assert!(store.matches(url, 8_192));
        assert!(store.remaining_bytes() < 8_192);

        let resumed_server = Arc::new(MemoryServer::new(data.clone()));
        let listener = Arc::new(RecordingListener::default());
        let report = DownloadSession::with_client(url, &output, test_config(2), resumed_server.clone())
            .with_listener(listener.clone())
            .run()
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(std::fs::read(&output).unwrap(), data);
        let offsets = resumed_server.requested_offsets();
        assert!(offsets.len() <= 2);
        assert!(offsets.iter().any(|&o| o != 0 && o != 4_096));
        assert!(!BreakpointStore::path_for(&output).exists());
        assert_eq!(listener.terminal().last().map(String::as_str), Some("complete 0"));
    }

    #[test]
    fn test_mismatched_store_starts_over() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("other.bin");
        std::fs::write(&output, b"stale").unwrap();
        BreakpointStore::create(
            BreakpointStore::path_for(&output),
            "http://example.com/old.bin",
            5,
            5,
            vec![CheckpointRecord {
                block_index: 0,
                start_offset: 5,
                remaining: 0,
                block_size: 5,
            }],
        )
        .unwrap();

        let data = payload(3_000);
        let server = Arc::new(MemoryServer::new(data.clone()));
        let report = DownloadSession::with_client("http://example.com/new.bin", &output, test_config(3), server.clone())
            .run()
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(server.requested_offsets(), vec![0, 1000, 2000]);
        assert_eq!(std::fs::read(&output).unwrap(), data);
    }

    #[test]
    fn test_protocol_error_keeps_store() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("denied.bin");
        let mut server = MemoryServer::new(payload(2_000));
        server.status = 200;
        let listener = Arc::new(RecordingListener::default());

        let report = DownloadSession::with_client("http://example.com/denied.bin", &output, test_config(2), Arc::new(server))
            .with_listener(listener.clone())
            .run()
            .unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.failed, vec![(0, 200), (1, 200)]);
        assert!(BreakpointStore::path_for(&output).exists());
        assert_eq!(listener.terminal().last().map(String::as_str), Some("error 0 200"));
    }

    #[test]
    fn test_short_stream_keeps_store() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("short.bin");
        let mut server = MemoryServer::new(payload(1_000));
        server.claimed_length = Some(2_000);

        let report = DownloadSession::with_client("http://example.com/short.bin", &output, test_config(2), Arc::new(server))
            .run()
            .unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.failed, vec![(1, 0)]);
        let store = BreakpointStore::open(&BreakpointStore::path_for(&output))
            .unwrap()
            .unwrap();
        assert_eq!(store.remaining_bytes(), 1_000);
    }

    #[test]
    fn test_unknown_length_single_block() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nolength.bin");
        let mut server = MemoryServer::new(payload(1_500));
        server.advertise_length = false;

        let report = DownloadSession::with_client("http://example.com/nolength.bin", &output, test_config(4), Arc::new(server))
            .run()
            .unwrap();

        assert_eq!(report.total_length, None);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0], (0, 0));
        assert!(!BreakpointStore::path_for(&output).exists());
    }

    #[test]
    fn test_unknown_length_discovered_by_worker() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("late.bin");
        let data = payload(3_000);
        let server = Arc::new(MemoryServer::new(data.clone()).failing_probes(1));
        let listener = Arc::new(RecordingListener::default());

        let report = DownloadSession::with_client("http://example.com/late.bin", &output, test_config(4), server.clone())
            .with_listener(listener.clone())
            .run()
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.blocks, 1);
        assert_eq!(report.total_length, Some(3_000));
        assert_eq!(report.downloaded_bytes, 3_000);
        assert_eq!(server.requested_offsets(), vec![0]);
        assert_eq!(std::fs::read(&output).unwrap(), data);
        assert_eq!(listener.terminal(), vec!["start 0 0 0", "complete 0"]);
    }

    #[test]
    fn test_unknown_length_discards_stale_store() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("moved.bin");
        std::fs::write(&output, payload(100)).unwrap();
        let store_path = BreakpointStore::path_for(&output);
        BreakpointStore::create(
            store_path.clone(),
            "http://old.example.com/moved.bin",
            100,
            100,
            vec![CheckpointRecord {
                block_index: 0,
                start_offset: 50,
                remaining: 50,
                block_size: 100,
            }],
        )
        .unwrap();

        let data = payload(700);
        let server = Arc::new(MemoryServer::new(data.clone()).failing_probes(1));
        let report = DownloadSession::with_client("http://example.com/moved.bin", &output, test_config(2), server)
            .run()
            .unwrap();

        assert!(report.is_complete());
        assert!(!store_path.exists());
        assert_eq!(std::fs::read(&output).unwrap(), data);
    }

    #[test]
    fn test_failed_probe_never_discards_breakpoints() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("keep.bin");
        let url = "http://example.com/keep.bin";
        let data = payload(8_192);
        let store_path = BreakpointStore::path_for(&output);

        let token = CancellationToken::new();
        let mut first = MemoryServer::new(data.clone());
        first.cancel_after = Some((1_024, token.clone()));
        let report = DownloadSession::with_client(url, &output, test_config(2), Arc::new(first))
            .with_cancellation(token)
            .run()
            .unwrap();
        assert!(report.canceled);
        let remaining = BreakpointStore::open(&store_path).unwrap().unwrap().remaining_bytes();
        assert!(remaining < 8_192);

        let mut offline = MemoryServer::new(data.clone());
        offline.advertise_length = false;
        let listener = Arc::new(RecordingListener::default());
        let report = DownloadSession::with_client(url, &output, test_config(2), Arc::new(offline))
            .with_listener(listener.clone())
            .run()
            .unwrap();
        assert_eq!(report.failed, vec![(0, 0)]);
        assert_eq!(report.total_length, Some(8_192));
        assert_eq!(std::fs::metadata(&output).unwrap().len(), 8_192);
        assert_eq!(
            BreakpointStore::open(&store_path).unwrap().unwrap().remaining_bytes(),
            remaining
        );
        assert_eq!(listener.terminal(), vec!["error 0 0"]);

        let healthy = Arc::new(MemoryServer::new(data.clone()));
        let report = DownloadSession::with_client(url, &output, test_config(2), healthy)
            .run()
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(std::fs::read(&output).unwrap(), data);
        assert!(!store_path.exists());
    }

    #[test]
    fn test_flaky_probe_retried_before_resume() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("flaky.bin");
        let url = "http://example.com/flaky.bin";
        let data = payload(4_096);

        let token = CancellationToken::new();
        let mut first = MemoryServer::new(data.clone());
        first.cancel_after = Some((512, token.clone()));
        DownloadSession::with_client(url, &output, test_config(2), Arc::new(first))
            .with_cancellation(token)
            .run()
            .unwrap();
        assert!(BreakpointStore::path_for(&output).exists());

        let config = test_config(2).with_probe_retry(RetryPolicy::new(2, Duration::ZERO, Duration::ZERO));
        let flaky = Arc::new(MemoryServer::new(data.clone()).failing_probes(1));
        let report = DownloadSession::with_client(url, &output, config, flaky.clone())
            .run()
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.blocks, 2);
        assert!(flaky.requested_offsets().iter().any(|&o| o != 0 && o != 2_048));
        assert_eq!(std::fs::read(&output).unwrap(), data);
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("empty.bin");
        let listener = Arc::new(RecordingListener::default());

        let report = DownloadSession::with_client(
            "http://example.com/empty.bin",
            &output,
            test_config(4),
            Arc::new(MemoryServer::new(Vec::new())),
        )
        .with_listener(listener.clone())
        .run()
        .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.total_length, Some(0));
        assert_eq!(std::fs::metadata(&output).unwrap().len(), 0);
        assert_eq!(listener.terminal(), vec!["start 0 0 0", "complete 0"]);
    }

    #[test]
    fn test_canceled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("never.bin");
        let session = DownloadSession::with_client(
            "http://example.com/never.bin",
            &output,
            test_config(2),
            Arc::new(MemoryServer::new(payload(100))),
        );
        session.cancel();

        let report = session.run().unwrap();
        assert!(report.canceled);
        assert!(!output.exists());
    }

    #[test]
    fn test_empty_url_rejected() {
        let session = DownloadSession::with_client(
            " ",
            "out.bin",
            test_config(1),
            Arc::new(MemoryServer::new(Vec::new())),
        );
        assert!(matches!(session.run(), Err(DownloadError::Config(_))));
    }
}
