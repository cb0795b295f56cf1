//! The failures ledger: tasks whose latest attempt failed.
//!
//! The ledger owns the `failed_files` counter on the progress tracker, so the
//! counter always equals the number of distinct tasks in the ledger. A task is
//! removed before its completion is counted, so no file is ever both failed and
//! completed.

use std::sync::{Arc, Mutex, PoisonError};

use url::Url;

use crate::crawl::FileTask;
use crate::progress::ProgressTracker;

/// A failed attempt of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// The task that failed.
    pub task: FileTask,
    /// Human-readable failure reason.
    pub reason: String,
    /// Attempt number that failed; the initial pass is attempt 1.
    pub attempt: u32,
    /// Bytes of this task already credited to the progress tracker.
    pub bytes_credited: u64,
    /// Whether the task's `Content-Length` was already added to unfixed totals.
    pub size_accounted: bool,
}

/// Shared list of failed tasks, keyed by source URL.
#[derive(Debug)]
pub struct FailureLedger {
    records: Mutex<Vec<FailureRecord>>,
    progress: Arc<ProgressTracker>,
}

impl FailureLedger {
    /// Creates an empty ledger bound to a progress tracker.
    #[must_use]
    pub fn new(progress: Arc<ProgressTracker>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            progress,
        }
    }

    /// Records a failure, replacing any earlier record of the same task.
    ///
    /// Returns true if the task was not in the ledger before.
    pub fn record(&self, record: FailureRecord) -> bool {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = records
            .iter_mut()
            .find(|r| r.task.source_url() == record.task.source_url())
        {
            *existing = record;
            return false;
        }
        records.push(record);
        self.progress.file_failed();
        true
    }

    /// Removes the task with this source URL, if present.
    pub fn resolve(&self, url: &Url) -> Option<FailureRecord> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let index = records.iter().position(|r| r.task.source_url() == url)?;
        let removed = records.remove(index);
        self.progress.failure_cleared();
        Some(removed)
    }

    /// Copies out the current records in first-failure order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<FailureRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of tasks currently failed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no task is currently failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
