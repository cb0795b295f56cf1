//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use dirpull::HistoryFormat;

/// Mirror matching files from an HTTP directory listing.
///
/// dirpull walks autoindex pages below URL up to a maximum depth, counts the
/// files whose extension matches, then downloads them into a timestamped
/// `SCRAPE_<DD-MM_HH-MM>` folder, retrying failures a bounded number of times.
///
/// Press `p` to pause or resume and `c` to cancel while a download runs.
#[derive(Parser, Debug)]
#[command(name = "dirpull")]
#[command(author, version, about)]
pub struct Args {
    /// Base URL of the directory listing
    pub url: String,

    /// Maximum recursion depth; 0 only reads the base listing [default: 1]
    #[arg(short = 'd', long)]
    pub depth: Option<u32>,

    /// Comma-separated file extensions to download [default: .bsp,.bz2]
    #[arg(short = 't', long)]
    pub types: Option<String>,

    /// Parent directory of the timestamped destination folder [default: .]
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum concurrent transfers (1-32) [default: 4]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub concurrency: Option<u8>,

    /// Retry rounds for failed transfers (0-10) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Seconds to wait before each retry round (0-3600) [default: 5]
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=3600))]
    pub retry_delay: Option<u64>,

    /// Skip the counting pass; totals grow as files are discovered
    #[arg(long)]
    pub skip_count: bool,

    /// History log path [default: download_history.log next to the destination]
    #[arg(long)]
    pub history_file: Option<PathBuf>,

    /// History log format
    #[arg(long, value_enum, default_value_t = HistoryFormatArg::Text)]
    pub history_format: HistoryFormatArg,

    /// Do not write a history log
    #[arg(long, conflicts_with = "history_file")]
    pub no_history: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// History format names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HistoryFormatArg {
    /// `[timestamp] url - STATUS - size` lines
    Text,
    /// One JSON object per line
    Json,
}

impl From<HistoryFormatArg> for HistoryFormat {
    fn from(value: HistoryFormatArg) -> Self {
        match value {
            HistoryFormatArg::Text => Self::Text,
            HistoryFormatArg::Json => Self::JsonLines,
        }
    }
}
