//! Error types for block downloads.
//!
//! Two layers are kept apart:
//! - [`BlockFailure`] is the terminal failure of a single block worker. It is
//!   reported through the listener as an error code and never aborts the
//!   process.
//! - [`DownloadError`] covers session-level setup (configuration, the
//!   breakpoint store, output file preparation) and is returned as `Result`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for session and configuration operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Failure talking to the remote server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The URL could not be parsed.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Connect or read exceeded the configured timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// The request could not be sent or the connection dropped.
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// Reading the response body failed mid-stream.
    #[error("read error: {0}")]
    Read(String),

    /// The server did not report a usable content length.
    #[error("no content length reported for {url}")]
    MissingLength { url: String },

    /// A non-success status was returned for a size probe.
    #[error("size probe of {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Terminal failure of one block worker.
#[derive(Debug, Error)]
pub enum BlockFailure {
    /// Total size could not be determined within the retry budget.
    #[error("size discovery failed after {attempts} attempts: {last}")]
    SizeDiscovery { attempts: u32, last: TransportError },

    /// The output file could not be opened or positioned.
    #[error("failed to open {}: {source}", .path.display())]
    FileOpen { path: PathBuf, source: io::Error },

    /// The server answered something other than 206 Partial Content.
    #[error("server answered HTTP {status} instead of 206 Partial Content")]
    Protocol { status: u16 },

    /// Connection, timeout or malformed URL.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Writing block data to disk failed.
    #[error("failed to write block data: {0}")]
    Write(#[source] io::Error),
}

impl BlockFailure {
    /// Listener-facing error code: the HTTP status for protocol failures, 0 otherwise.
    pub fn code(&self) -> u16 {
        match self {
            Self::Protocol { status } => *status,
            _ => 0,
        }
    }
}

/// Errors from session setup, configuration and breakpoint persistence.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Invalid configuration value or worker arguments.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failed to read a file.
    #[error("failed to read {}: {source}", .path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file.
    #[error("failed to write {}: {source}", .path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Breakpoint store contents could not be parsed.
    #[error("corrupt breakpoint store {}: {reason}", .path.display())]
    CorruptStore { path: PathBuf, reason: String },

    /// HTTP client construction or size probing failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
