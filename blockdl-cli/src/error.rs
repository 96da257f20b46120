//! CLI error types.

use blockdl::DownloadError;
use thiserror::Error;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("Download canceled; run the same command again to resume")]
    Canceled,

    #[error("Download failed ({failed} block(s), first error code {code}); run again to resume")]
    Incomplete { failed: usize, code: u16 },

    #[error("No interrupted download found for {0}")]
    NoBreakpoints(String),

    #[error("Failed to install Ctrl-C handler: {0}")]
    Signal(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Canceled => 130,
            CliError::Incomplete { .. } => 2,
            _ => 1,
        }
    }
}
