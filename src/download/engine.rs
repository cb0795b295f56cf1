//! Transfer engine: streams one file to disk, and runs whole download passes.
//!
//! A single transfer ([`TransferEngine::transfer`]) never retries internally.
//! It reports a [`TransferOutcome`], updates the shared progress counters per
//! chunk and per completion, records failures in the [`FailureLedger`], and
//! reports every transition to the history sink.
//!
//! [`TransferEngine::run_pass`] drains a [`Crawl`] through a semaphore-bounded
//! worker pool: a permit is acquired before each transfer is spawned and
//! released when the transfer task ends.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::client::content_length;
use super::{DownloadError, HttpClient};
use crate::control::SessionControls;
use crate::crawl::{Crawl, CrawlSummary, FileTask};
use crate::history::{HistoryEvent, HistorySink, HistoryStatus};
use crate::progress::ProgressTracker;
use crate::retry::{FailureLedger, FailureRecord};

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 32;

/// Default number of concurrent transfers in a download pass.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Result of one transfer attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The file was fully written.
    Completed {
        /// Bytes written by this attempt.
        bytes: u64,
    },
    /// Cancellation was observed; the partial file was removed.
    Cancelled {
        /// Bytes written before stopping.
        bytes: u64,
    },
    /// The attempt failed and the task is in the failure ledger.
    Failed {
        /// Why it failed.
        reason: String,
        /// Bytes written before failing.
        bytes: u64,
    },
}

/// Tally of a download pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Transfers that completed.
    pub completed: u64,
    /// Transfers that failed.
    pub failed: u64,
    /// Transfers that observed cancellation.
    pub cancelled: u64,
    /// Statistics of the crawl that fed the pass.
    pub crawl: CrawlSummary,
}

/// Per-attempt accounting carried across retries of one task.
#[derive(Debug, Default)]
struct Attempt {
    number: u32,
    credited: u64,
    size_accounted: bool,
    written: u64,
    created: Option<PathBuf>,
}

enum StreamEnd {
    Completed,
    Cancelled,
}

/// Streams files under a destination root and accounts for them.
#[derive(Clone)]
pub struct TransferEngine {
    client: HttpClient,
    destination_root: PathBuf,
    progress: Arc<ProgressTracker>,
    ledger: Arc<FailureLedger>,
    history: Arc<dyn HistorySink>,
}

impl fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferEngine")
            .field("destination_root", &self.destination_root)
            .field("failed", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

impl TransferEngine {
    /// Creates an engine writing under `destination_root`.
    #[must_use]
    pub fn new(
        client: HttpClient,
        destination_root: impl Into<PathBuf>,
        progress: Arc<ProgressTracker>,
        ledger: Arc<FailureLedger>,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        Self {
            client,
            destination_root: destination_root.into(),
            progress,
            ledger,
            history,
        }
    }

    /// The failure ledger this engine records into.
    #[must_use]
    pub fn ledger(&self) -> &Arc<FailureLedger> {
        &self.ledger
    }

    /// First attempt of a task.
    pub async fn transfer(&self, task: &FileTask, controls: &SessionControls) -> TransferOutcome {
        let attempt = Attempt {
            number: 1,
            ..Attempt::default()
        };
        self.run(task, controls, attempt).await
    }

    /// Next attempt of a task that is in the failure ledger.
    ///
    /// Only bytes beyond `record.bytes_credited` are credited again, so a
    /// retried file is not counted twice.
    pub async fn retry(&self, record: &FailureRecord, controls: &SessionControls) -> TransferOutcome {
        let attempt = Attempt {
            number: record.attempt + 1,
            credited: record.bytes_credited,
            size_accounted: record.size_accounted,
            ..Attempt::default()
        };
        self.run(&record.task, controls, attempt).await
    }

    /// Transfers every task of `crawl` with at most `concurrency` in flight.
    ///
    /// Stops taking new tasks once cancellation is requested; in-flight
    /// transfers observe it at their next chunk.
    #[instrument(skip(self, crawl, controls), fields(root = %self.destination_root.display()))]
    pub async fn run_pass(
        &self,
        mut crawl: Crawl,
        controls: &SessionControls,
        concurrency: usize,
    ) -> PassSummary {
        let semaphore = Arc::new(Semaphore::new(
            concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),
        ));
        let mut handles: Vec<JoinHandle<TransferOutcome>> = Vec::new();

        info!("download pass started");

        loop {
            let next = tokio::select! {
                () = controls.cancelled() => None,
                task = crawl.next() => task,
            };
            let Some(task) = next else {
                break;
            };

            let permit = tokio::select! {
                () = controls.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            debug!(url = %task, "transfer queued");
            let engine = self.clone();
            let controls = controls.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                engine.transfer(&task, &controls).await
            }));
        }

        debug!(task_count = handles.len(), "waiting for in-flight transfers");

        let mut summary = PassSummary::default();
        for handle in handles {
            match handle.await {
                Ok(TransferOutcome::Completed { .. }) => summary.completed += 1,
                Ok(TransferOutcome::Failed { .. }) => summary.failed += 1,
                Ok(TransferOutcome::Cancelled { .. }) => summary.cancelled += 1,
                Err(e) => {
                    warn!(error = %e, "transfer task panicked or was aborted");
                    summary.failed += 1;
                }
            }
        }
        summary.crawl = crawl.finish().await;

        info!(
            completed = summary.completed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "download pass finished"
        );
        summary
    }

    #[instrument(skip(self, task, controls, attempt), fields(url = %task, attempt = attempt.number))]
    async fn run(
        &self,
        task: &FileTask,
        controls: &SessionControls,
        mut attempt: Attempt,
    ) -> TransferOutcome {
        let url = task.source_url().as_str();
        if controls.is_cancelled() {
            debug!("cancelled before start");
            return TransferOutcome::Cancelled { bytes: 0 };
        }

        let result = self.stream_to_disk(task, controls, &mut attempt).await;
        let written = attempt.written;

        match result {
            Ok(StreamEnd::Completed) => {
                if self.ledger.resolve(task.source_url()).is_some() {
                    info!(bytes = written, "recovered on retry");
                }
                self.progress.file_completed();
                self.history
                    .record(HistoryEvent::now(url, HistoryStatus::Completed, written));
                debug!(bytes = written, "transfer completed");
                TransferOutcome::Completed { bytes: written }
            }
            Ok(StreamEnd::Cancelled) => {
                remove_partial(attempt.created.as_deref()).await;
                self.history
                    .record(HistoryEvent::now(url, HistoryStatus::Cancelled, written));
                debug!(bytes = written, "transfer cancelled");
                TransferOutcome::Cancelled { bytes: written }
            }
            Err(e) => {
                remove_partial(attempt.created.as_deref()).await;
                let reason = e.to_string();
                warn!(bytes = written, error = %reason, "transfer failed");
                self.history.record(HistoryEvent::now(
                    url,
                    HistoryStatus::Error(reason.clone()),
                    written,
                ));
                self.ledger.record(FailureRecord {
                    task: task.clone(),
                    reason: reason.clone(),
                    attempt: attempt.number,
                    bytes_credited: attempt.credited.max(written),
                    size_accounted: attempt.size_accounted,
                });
                TransferOutcome::Failed {
                    reason,
                    bytes: written,
                }
            }
        }
    }

    async fn stream_to_disk(
        &self,
        task: &FileTask,
        controls: &SessionControls,
        attempt: &mut Attempt,
    ) -> Result<StreamEnd, DownloadError> {
        let url = task.source_url().as_str();
        let path = task
            .destination(&self.destination_root)
            .ok_or_else(|| DownloadError::unsafe_path(url, task.relative_path()))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let response = tokio::select! {
            () = controls.cancelled() => return Ok(StreamEnd::Cancelled),
            response = self.client.open_stream(task.source_url()) => response?,
        };

        let expected = content_length(&response);
        if !attempt.size_accounted && !self.progress.totals_fixed() {
            self.progress.add_expected_bytes(expected.unwrap_or(0));
            attempt.size_accounted = true;
        }
        self.history.record(HistoryEvent::now(
            url,
            HistoryStatus::Started,
            expected.unwrap_or(0),
        ));

        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| DownloadError::io(&path, e))?;
        attempt.created = Some(path.clone());
        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                () = controls.cancelled() => return Ok(StreamEnd::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|e| DownloadError::from_reqwest(url, e))?;

            // Hold the chunk while paused; nothing is dropped or written twice.
            if !controls.wait_until_running().await {
                return Ok(StreamEnd::Cancelled);
            }

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(&path, e))?;

            let before = attempt.written;
            attempt.written += chunk.len() as u64;
            let credit = attempt.written.saturating_sub(before.max(attempt.credited));
            if credit > 0 {
                self.progress.record_bytes(credit);
            }
        }

        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(&path, e))?;
        Ok(StreamEnd::Completed)
    }
}

async fn remove_partial(path: Option<&Path>) {
    let Some(path) = path else {
        return;
    };
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), error = %e, "could not remove partial file");
    }
}
