//! Live progress bar for a running session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dirpull::progress::format::{format_byte_count, format_eta, format_speed};
use dirpull::{ProgressSnapshot, SessionController};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

const REDRAW_INTERVAL: Duration = Duration::from_millis(200);

/// Spawns the progress bar when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `enabled` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    enabled: bool,
    controller: Arc<SessionController>,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !enabled {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_bar(controller, Arc::clone(&stop));
    (Some(handle), stop)
}

/// Signals the bar to stop and waits for it. Returns false if the bar task
/// panicked or was aborted.
pub(crate) async fn stop_progress_ui(
    handle: Option<tokio::task::JoinHandle<()>>,
    stop: &AtomicBool,
) -> bool {
    stop.store(true, Ordering::SeqCst);
    match handle {
        Some(handle) => match handle.await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "progress display did not complete");
                false
            }
        },
        None => true,
    }
}

fn spawn_bar(controller: Arc<SessionController>, stop: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            let snapshot = controller.progress();
            bar.set_length(snapshot.counters.total_bytes.max(1));
            bar.set_position(
                snapshot
                    .counters
                    .downloaded_bytes
                    .min(snapshot.counters.total_bytes),
            );
            bar.set_message(render_line(&snapshot, &controller.status_message()));
            tokio::time::sleep(REDRAW_INTERVAL).await;
        }

        bar.finish_and_clear();
    })
}

/// One-line summary of a snapshot followed by the current status message.
pub(crate) fn render_line(snapshot: &ProgressSnapshot, status: &str) -> String {
    let counters = &snapshot.counters;
    let mut line = format!(
        "{}/{} files  {} / {}  {}  ETA {}",
        counters.downloaded_files,
        counters.total_files,
        format_byte_count(counters.downloaded_bytes),
        format_byte_count(counters.total_bytes),
        format_speed(snapshot.speed),
        format_eta(snapshot.eta),
    );
    if counters.failed_files > 0 {
        line.push_str(&format!("  ({} failed)", counters.failed_files));
    }
    if !status.is_empty() {
        line.push_str("  ");
        line.push_str(status);
    }
    line
}
