//! Get command - download a URL into a file, resuming when possible.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use blockdl::config::ConfigFile;
use blockdl::{DownloadSession, SessionReport};
use clap::Args;
use tracing::{debug, info};

use crate::error::CliError;
use crate::progress::BarListener;

/// Output name used when the URL has no usable file name.
const FALLBACK_FILE_NAME: &str = "download.bin";

/// Arguments for the get command.
#[derive(Debug, Args)]
pub struct GetArgs {
    /// URL to download
    pub url: String,

    /// Output file (defaults to the last path segment of the URL)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of parallel blocks
    #[arg(short, long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    pub blocks: Option<usize>,

    /// Config file (defaults to the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Run the get command.
pub fn run(args: GetArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;

    let mut download = config.download;
    if let Some(blocks) = args.blocks {
        download = download.with_blocks(blocks);
    }

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(file_name_from_url(&args.url)));
    debug!(url = %args.url, output = %output.display(), blocks = download.blocks, "Resolved download");

    let listener = Arc::new(BarListener::new());
    let session = DownloadSession::new(args.url.clone(), output.clone(), download)?
        .with_listener(listener.clone());

    let token = session.cancellation_token();
    ctrlc::set_handler(move || token.cancel()).map_err(|e| CliError::Signal(e.to_string()))?;

    let report = session.run()?;
    listener.finish();
    info!(output = %output.display(), complete = report.is_complete(), "Session finished");

    summarize(&report, &output.display().to_string())
}

/// Explicit config path, else the user config file, else defaults.
fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let loaded = match path {
        Some(path) => ConfigFile::load_from(path),
        None => ConfigFile::load(),
    };
    loaded.map_err(|e| CliError::Config(e.to_string()))
}

fn summarize(report: &SessionReport, output: &str) -> Result<(), CliError> {
    if report.canceled {
        return Err(CliError::Canceled);
    }
    if let Some((_, code)) = report.failed.first() {
        return Err(CliError::Incomplete {
            failed: report.failed.len(),
            code: *code,
        });
    }
    println!("Saved {} ({} bytes)", output, report.downloaded_bytes);
    Ok(())
}

/// Last non-empty path segment of `url`, without query or fragment.
fn file_name_from_url(url: &str) -> String {
    let without_suffix = url.split(['?', '#']).next().unwrap_or(url);
    let path = without_suffix
        .split_once("://")
        .map_or(without_suffix, |(_, rest)| rest);

    match path.split_once('/') {
        Some((_, rest)) => rest
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(FALLBACK_FILE_NAME)
            .to_string(),
        None => FALLBACK_FILE_NAME.to_string(),
    }
}
