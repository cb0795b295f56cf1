//! HTTP access and file transfers.
//!
//! - [`HttpClient`] fetches listing pages, probes sizes and opens streamed
//!   transfers (30s connect timeout, 5min read timeout by default).
//! - [`TransferEngine`] streams one file to disk at chunk granularity,
//!   honouring pause and cancellation, and runs bounded-concurrency passes.
//! - [`DownloadError`] carries the URL or path of every failure.
//!
//! # Example
//!
//! ```no_run
//! use dirpull::download::HttpClient;
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let listing = client
//!     .fetch_listing(&Url::parse("http://mirror.example/maps/")?)
//!     .await?;
//! println!("{} bytes of listing HTML", listing.len());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod path;

pub use client::HttpClient;
pub use engine::{
    DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY, PassSummary, TransferEngine,
    TransferOutcome,
};
pub use error::DownloadError;
pub use path::local_path;
