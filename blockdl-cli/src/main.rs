//! blockdl CLI - resumable block-parallel downloads from the command line.

mod commands;
mod error;
mod progress;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::get::GetArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "blockdl", version, about = "Resumable block-parallel HTTP downloads")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download a URL, resuming any interrupted download of the same file
    Get(GetArgs),

    /// Show per-block progress of an interrupted download
    Status {
        /// Output file of the download
        path: std::path::PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result: Result<(), CliError> = match cli.command {
        Commands::Get(args) => commands::get::run(args),
        Commands::Status { path } => commands::status::run(&path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// Log to stderr so progress output on stdout stays readable.
fn init_logging(verbose: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Log level used when `RUST_LOG` is not set.
fn default_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}
