//! Download-wide lifecycle listener.

/// Observer of a whole download, keyed by an opaque task id.
///
/// `total` and `current` are byte counts for the entire file. Calls arrive on
/// worker or reporter threads and must not block.
pub trait DownloadListener: Send + Sync {
    /// The download started; `current` counts bytes already on disk from a resume.
    fn on_start(&self, _id: u64, _total: u64, _current: u64) {}

    /// Periodic progress update.
    fn on_progress(&self, _id: u64, _total: u64, _current: u64) {}

    /// Every block finished.
    fn on_complete(&self, _id: u64) {}

    /// At least one block failed; `code` is the first block's HTTP status or 0.
    fn on_error(&self, _id: u64, _code: u16) {}

    /// The download was canceled.
    fn on_cancel(&self, _id: u64) {}
}

/// Listener that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDownloadListener;

impl DownloadListener for NoopDownloadListener {}
