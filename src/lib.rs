//! dirpull core library
//!
//! Mirrors the files of an HTTP directory-listing tree to local storage:
//! discovers matching files by parsing autoindex HTML pages up to a maximum
//! depth, counts them, then streams them to disk with live progress,
//! pause/resume, cancellation and bounded retry of failed transfers.
//!
//! # Architecture
//!
//! - [`config`] - Session configuration and destination naming
//! - [`listing`] - Listing-page parser and extension filter
//! - [`crawl`] - Depth-limited traversal yielding file tasks
//! - [`download`] - HTTP client and transfer engine
//! - [`progress`] - Shared counters and sampled speed/ETA
//! - [`retry`] - Failure ledger and round-based retry
//! - [`control`] - Cancellation token and pause gate
//! - [`history`] - Transfer history sinks
//! - [`session`] - The session state machine tying it all together
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dirpull::{HttpClient, NullHistory, SessionConfig, SessionController, SessionOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::from_raw("http://mirror.example/maps/", "1", ".bsp,.bz2", "./out")?;
//! let controller =
//!     SessionController::new(HttpClient::new(), SessionOptions::default(), Arc::new(NullHistory))?;
//! controller.start(config)?;
//! if let Some(outcome) = controller.wait().await {
//!     println!("{outcome}");
//! }
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod control;
pub mod crawl;
pub mod download;
pub mod history;
pub mod listing;
pub mod progress;
pub mod retry;
pub mod session;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, SessionConfig};
pub use control::SessionControls;
pub use crawl::{Crawl, CrawlMode, CrawlSummary, Crawler, FileTask};
pub use download::{DownloadError, HttpClient, TransferEngine, TransferOutcome};
pub use history::{
    FileHistory, HistoryError, HistoryEvent, HistoryFormat, HistorySink, HistoryStatus,
    MemoryHistory, NullHistory,
};
pub use listing::{DirectoryEntry, ExtensionFilter, parse_listing};
pub use progress::{ProgressCounters, ProgressSnapshot, ProgressTracker};
pub use retry::{FailureLedger, FailureRecord, RetryPolicy, RetryQueue, RetryReport, RetryRound};
pub use session::{
    SessionController, SessionError, SessionOptions, SessionOutcome, SessionRunState,
};
