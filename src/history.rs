//! Append-only history of transfer events.
//!
//! The core reports every transfer transition to a [`HistorySink`]. Recording
//! is fire-and-forget: a sink must not block the caller and must not fail the
//! transfer, so write errors are logged and dropped.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// URL recorded for session-level events that do not belong to one file.
pub const SYSTEM_URL: &str = "SYSTEM";

const HEADER_TITLE: &str = "dirpull download history";

/// Status of one history event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryStatus {
    /// Response received, writing begins.
    Started,
    /// File fully written.
    Completed,
    /// Transfer or session stopped by cancellation.
    Cancelled,
    /// Transfer failed with the given detail.
    Error(String),
}

impl fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => f.write_str("STARTED"),
            Self::Completed => f.write_str("COMPLETED"),
            Self::Cancelled => f.write_str("CANCELLED"),
            Self::Error(detail) => write!(f, "ERROR:{detail}"),
        }
    }
}

impl Serialize for HistoryStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEvent {
    /// Local wall-clock time of the event.
    pub timestamp: DateTime<Local>,
    /// Source URL, or [`SYSTEM_URL`].
    pub url: String,
    /// What happened.
    pub status: HistoryStatus,
    /// Expected size for `Started`/`Completed`, bytes written so far otherwise.
    pub size_bytes: u64,
}

impl HistoryEvent {
    /// Creates an event stamped with the current local time.
    pub fn now(url: impl Into<String>, status: HistoryStatus, size_bytes: u64) -> Self {
        Self {
            timestamp: Local::now(),
            url: url.into(),
            status,
            size_bytes,
        }
    }

    /// Renders the event as one text log line (without newline):
    /// `[2024-01-31 12:00:00] <url> - COMPLETED - 1.50MB`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_text_line(&self) -> String {
        let size_mb = self.size_bytes as f64 / (1024.0 * 1024.0);
        format!(
            "[{}] {} - {} - {size_mb:.2}MB",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.url,
            self.status
        )
    }
}

/// Receiver of history events.
pub trait HistorySink: Send + Sync {
    /// Records one event. Must not block and must not panic.
    fn record(&self, event: HistoryEvent);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHistory;

impl HistorySink for NullHistory {
    fn record(&self, _event: HistoryEvent) {}
}

/// Sink that keeps events in memory; used by tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    events: Mutex<Vec<HistoryEvent>>,
}

impl MemoryHistory {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out every event recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<HistoryEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events recorded for one URL, in order.
    #[must_use]
    pub fn events_for(&self, url: &str) -> Vec<HistoryEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.url == url)
            .collect()
    }
}

impl HistorySink for MemoryHistory {
    fn record(&self, event: HistoryEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// On-disk layout of a [`FileHistory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryFormat {
    /// Human-readable lines after a title header.
    #[default]
    Text,
    /// One JSON object per line, no header.
    JsonLines,
}

/// Errors opening a history file.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The file could not be opened or its header written.
    #[error("could not open history file {path}: {source}")]
    Open {
        /// The history file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

enum Command {
    Write(HistoryEvent),
    Flush(oneshot::Sender<()>),
}

/// Sink appending to a file from a background writer task.
///
/// [`HistorySink::record`] only enqueues; the writer task owns the file.
#[derive(Debug, Clone)]
pub struct FileHistory {
    path: PathBuf,
    tx: mpsc::UnboundedSender<Command>,
}

impl FileHistory {
    /// Opens (or creates) the history file and starts the writer task.
    ///
    /// Missing parent directories are created.
    ///
    /// A new text-format file starts with a title line and a separator line;
    /// an existing file is appended to as-is.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Open`] if the file cannot be opened or the
    /// header cannot be written.
    pub async fn open(path: impl AsRef<Path>, format: HistoryFormat) -> Result<Self, HistoryError> {
        let path = path.as_ref().to_path_buf();
        let open_error = |source| HistoryError::Open {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(open_error)?;
        }
        let is_new = !matches!(tokio::fs::metadata(&path).await, Ok(meta) if meta.len() > 0);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(open_error)?;

        if is_new && format == HistoryFormat::Text {
            let header = format!("{HEADER_TITLE}\n{}\n", "=".repeat(40));
            file.write_all(header.as_bytes()).await.map_err(open_error)?;
            file.flush().await.map_err(open_error)?;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(file, path.clone(), format, rx));
        Ok(Self { path, tx })
    }

    /// Path of the history file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits until every event recorded before this call has been written.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

impl HistorySink for FileHistory {
    fn record(&self, event: HistoryEvent) {
        if self.tx.send(Command::Write(event)).is_err() {
            warn!(path = %self.path.display(), "history writer stopped; event dropped");
        }
    }
}

async fn write_loop(
    mut file: tokio::fs::File,
    path: PathBuf,
    format: HistoryFormat,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Write(event) => {
                let line = match format {
                    HistoryFormat::Text => Ok(event.to_text_line()),
                    HistoryFormat::JsonLines => serde_json::to_string(&event),
                };
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "could not encode history event");
                        continue;
                    }
                };
                if let Err(e) = file.write_all(format!("{line}\n").as_bytes()).await {
                    warn!(path = %path.display(), error = %e, "history write failed");
                }
            }
            Command::Flush(done) => {
                if let Err(e) = file.flush().await {
                    warn!(path = %path.display(), error = %e, "history flush failed");
                }
                let _ = done.send(());
            }
        }
    }
    let _ = file.flush().await;
}
