use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing::level_filters::LevelFilter;

/// Replays recorded spans through the span metrics connector, writing the resulting metrics to stdout as JSON lines.
#[derive(Parser)]
#[command(about)]
pub struct Cli {
    /// Enable verbose output.
    ///
    /// Specify multiple times for increasing verbosity. `SPANMETRICS_LOG_LEVEL` takes precedence when set.
    #[arg(short = 'v', action = ArgAction::Count)]
    verbose: u8,

    /// Path to the connector configuration file.
    ///
    /// Values from the file can be overridden with `SPANMETRICS_`-prefixed environment variables.
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<PathBuf>,

    /// Delay between replaying consecutive trace files, in milliseconds.
    ///
    /// Allows the periodic export to fire between files.
    #[arg(long, default_value_t = 0)]
    pub delay_ms: u64,

    /// Trace files to replay.
    ///
    /// Each file holds one or more JSON-encoded trace batches.
    #[arg(required = true)]
    pub trace_files: Vec<PathBuf>,
}

impl Cli {
    /// Returns the default log level implied by the verbosity flags.
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}
