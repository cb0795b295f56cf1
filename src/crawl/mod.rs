//! Depth-limited traversal of a directory-listing tree.
//!
//! [`Crawler::crawl`] walks the tree depth-first in document order from the
//! base URL (depth 0). A page at depth `d` is fetched only if `d <= max_depth`.
//! Matching files are yielded lazily as [`FileTask`] values over a bounded
//! channel, so a download pass can start transferring while the walk is still
//! discovering.
//!
//! A page that cannot be fetched is logged and its subtree treated as empty.
//! Cancellation is checked before every page fetch and every entry.

mod task;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use task::FileTask;
pub(crate) use task::relative_to;

use crate::config::SessionConfig;
use crate::download::HttpClient;
use crate::download::constants::CRAWL_CHANNEL_CAPACITY;
use crate::listing::{DirectoryEntry, parse_listing};
use crate::progress::ProgressTracker;

/// What a crawl does with each matching file besides yielding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlMode {
    /// Probe each file's size and add it to the expected totals.
    CountOnly,
    /// No probe; add one expected file per discovery unless totals are fixed.
    Collect,
}

/// Statistics of a finished walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Listing pages fetched and parsed.
    pub pages_fetched: u64,
    /// Listing pages whose fetch failed; their subtrees were skipped.
    pub pages_failed: u64,
    /// Matching files discovered.
    pub files_discovered: u64,
    /// Sum of probed sizes (count mode only).
    pub bytes_probed: u64,
    /// Whether the walk stopped because of cancellation.
    pub cancelled: bool,
}

/// A running walk: the lazy task sequence plus the walker's handle.
#[derive(Debug)]
pub struct Crawl {
    tasks: mpsc::Receiver<FileTask>,
    handle: JoinHandle<CrawlSummary>,
}

impl Crawl {
    /// Next discovered file, or `None` once the walk has ended.
    pub async fn next(&mut self) -> Option<FileTask> {
        self.tasks.recv().await
    }

    /// Stops consuming, waits for the walker and returns its summary.
    ///
    /// Tasks not yet received are discarded; the walker stops at its next
    /// send.
    pub async fn finish(self) -> CrawlSummary {
        drop(self.tasks);
        match self.handle.await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "crawl task did not complete");
                CrawlSummary::default()
            }
        }
    }
}

/// Walks the listing tree described by a [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct Crawler {
    client: HttpClient,
    config: Arc<SessionConfig>,
    progress: Arc<ProgressTracker>,
}

impl Crawler {
    /// Creates a crawler sharing the session's client and progress tracker.
    #[must_use]
    pub fn new(
        client: HttpClient,
        config: Arc<SessionConfig>,
        progress: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            client,
            config,
            progress,
        }
    }

    /// Starts a walk in the background and returns its lazy task sequence.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn crawl(&self, mode: CrawlMode, cancel: CancellationToken) -> Crawl {
        let (tx, tasks) = mpsc::channel(CRAWL_CHANNEL_CAPACITY);
        let walker = Walker {
            client: self.client.clone(),
            config: Arc::clone(&self.config),
            progress: Arc::clone(&self.progress),
            mode,
            cancel,
            tx,
            summary: CrawlSummary::default(),
            visited: HashSet::new(),
            files: HashSet::new(),
        };
        let handle = tokio::spawn(walker.run());
        Crawl { tasks, handle }
    }

    /// Runs a full count pass and returns its summary.
    ///
    /// Expected totals are accumulated on the progress tracker as a side
    /// effect.
    pub async fn count(&self, cancel: CancellationToken) -> CrawlSummary {
        let mut crawl = self.crawl(CrawlMode::CountOnly, cancel);
        while crawl.next().await.is_some() {}
        crawl.finish().await
    }
}

struct Walker {
    client: HttpClient,
    config: Arc<SessionConfig>,
    progress: Arc<ProgressTracker>,
    mode: CrawlMode,
    cancel: CancellationToken,
    tx: mpsc::Sender<FileTask>,
    summary: CrawlSummary,
    visited: HashSet<Url>,
    /// Relative paths already yielded; one local file per path.
    files: HashSet<String>,
}

impl Walker {
    #[instrument(
        skip_all,
        fields(base = %self.config.base_url(), mode = ?self.mode, max_depth = self.config.max_depth())
    )]
    async fn run(mut self) -> CrawlSummary {
        let base = self.config.base_url().clone();
        info!("crawl started");

        // One frame per fetched page: its unvisited entries and its depth.
        let mut stack: Vec<(VecDeque<DirectoryEntry>, u32)> = Vec::new();
        self.visited.insert(base.clone());
        if let Some(entries) = self.fetch_page(&base, 0).await {
            stack.push((entries.into(), 0));
        }

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some((entries, depth)) = stack.last_mut() else {
                break;
            };
            let depth = *depth;
            let Some(entry) = entries.pop_front() else {
                stack.pop();
                continue;
            };

            if entry.is_directory {
                let child_depth = depth + 1;
                if child_depth > self.config.max_depth()
                    || relative_to(&entry.url, &base).is_none()
                    || !self.visited.insert(entry.url.clone())
                {
                    continue;
                }
                if let Some(children) = self.fetch_page(&entry.url, child_depth).await {
                    stack.push((children.into(), child_depth));
                }
            } else if !self.handle_file(entry.url, &base).await {
                break;
            }
        }

        self.summary.cancelled = self.cancel.is_cancelled();
        info!(
            pages = self.summary.pages_fetched,
            failed_pages = self.summary.pages_failed,
            files = self.summary.files_discovered,
            bytes = self.summary.bytes_probed,
            cancelled = self.summary.cancelled,
            "crawl finished"
        );
        self.summary
    }

    async fn fetch_page(&mut self, url: &Url, depth: u32) -> Option<Vec<DirectoryEntry>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let result = tokio::select! {
            () = self.cancel.cancelled() => return None,
            result = self.client.fetch_listing(url) => result,
        };
        match result {
            Ok(html) => {
                self.summary.pages_fetched += 1;
                let entries = parse_listing(&html, url, self.config.extensions());
                debug!(url = %url, depth, entries = entries.len(), "listing page parsed");
                Some(entries)
            }
            Err(e) => {
                self.summary.pages_failed += 1;
                warn!(url = %url, depth, error = %e, "listing fetch failed; skipping subtree");
                None
            }
        }
    }

    /// Accounts for and yields one file. Returns false when the walk must stop.
    async fn handle_file(&mut self, url: Url, base: &Url) -> bool {
        let Some(task) = FileTask::new(url.clone(), base) else {
            debug!(url = %url, "file outside base URL ignored");
            return true;
        };
        if !self.files.insert(task.relative_path().to_string()) {
            debug!(url = %task, path = task.relative_path(), "local path already taken; skipping");
            return true;
        }

        match self.mode {
            CrawlMode::CountOnly => {
                let probed = tokio::select! {
                    () = self.cancel.cancelled() => return false,
                    result = self.client.probe_size(task.source_url()) => result,
                };
                let bytes = match probed {
                    Ok(size) => size.unwrap_or(0),
                    Err(e) => {
                        debug!(url = %task, error = %e, "size probe failed; counting 0 bytes");
                        0
                    }
                };
                self.summary.bytes_probed += bytes;
                self.progress.add_expected(1, bytes);
            }
            CrawlMode::Collect => self.progress.add_expected(1, 0),
        }
        self.summary.files_discovered += 1;

        tokio::select! {
            () = self.cancel.cancelled() => false,
            sent = self.tx.send(task) => sent.is_ok(),
        }
    }
}
