//! Shared progress accounting for a session.
//!
//! Counters are plain atomics mutated directly by their producers: the
//! crawler adds expected totals, the transfer engine adds bytes and
//! completions, the failure ledger moves the failed-files count. Derived
//! metrics (speed, ETA, elapsed) are only recomputed by [`ProgressTracker::sample`],
//! normally driven by [`ProgressTracker::spawn_sampler`] on a fixed period.
//! Observers read the last sample through [`ProgressTracker::latest`] and never
//! race the live counters.

pub mod format;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Default sampling period for derived metrics.
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_secs(1);

/// Point-in-time copy of the raw counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounters {
    /// Files expected in this session.
    pub total_files: u64,
    /// Bytes expected in this session.
    pub total_bytes: u64,
    /// Files fully written.
    pub downloaded_files: u64,
    /// Bytes written, including partial files.
    pub downloaded_bytes: u64,
    /// Files currently in the failure ledger.
    pub failed_files: u64,
}

/// Counters plus the metrics derived at sampling time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressSnapshot {
    /// Raw counters at sampling time.
    pub counters: ProgressCounters,
    /// Bytes per second since the previous sample.
    pub speed: f64,
    /// Remaining time at the current speed; `None` when speed is zero.
    pub eta: Option<Duration>,
    /// Time since the session started.
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Fraction of expected bytes written, in `0.0..=1.0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.counters.total_bytes == 0 {
            return 0.0;
        }
        (self.counters.downloaded_bytes as f64 / self.counters.total_bytes as f64).min(1.0)
    }
}

#[derive(Debug)]
struct SampleClock {
    started_at: Instant,
    last_at: Instant,
    last_bytes: u64,
}

impl SampleClock {
    fn starting_at(now: Instant) -> Self {
        Self {
            started_at: now,
            last_at: now,
            last_bytes: 0,
        }
    }
}

/// Concurrently updated session counters with periodic derived metrics.
#[derive(Debug)]
pub struct ProgressTracker {
    total_files: AtomicU64,
    total_bytes: AtomicU64,
    downloaded_files: AtomicU64,
    downloaded_bytes: AtomicU64,
    failed_files: AtomicU64,
    totals_fixed: AtomicBool,
    clock: Mutex<SampleClock>,
    latest: Mutex<ProgressSnapshot>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Creates a tracker with zeroed counters, started now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_files: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            downloaded_files: AtomicU64::new(0),
            downloaded_bytes: AtomicU64::new(0),
            failed_files: AtomicU64::new(0),
            totals_fixed: AtomicBool::new(false),
            clock: Mutex::new(SampleClock::starting_at(Instant::now())),
            latest: Mutex::new(ProgressSnapshot::default()),
        }
    }

    /// Zeroes every counter and restarts the clock for a new session.
    pub fn reset(&self) {
        self.total_files.store(0, Ordering::SeqCst);
        self.total_bytes.store(0, Ordering::SeqCst);
        self.downloaded_files.store(0, Ordering::SeqCst);
        self.downloaded_bytes.store(0, Ordering::SeqCst);
        self.failed_files.store(0, Ordering::SeqCst);
        self.totals_fixed.store(false, Ordering::SeqCst);
        *self.clock.lock().unwrap_or_else(PoisonError::into_inner) =
            SampleClock::starting_at(Instant::now());
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = ProgressSnapshot::default();
    }

    /// Adds discovered work to the expected totals.
    ///
    /// Ignored once totals are fixed.
    pub fn add_expected(&self, files: u64, bytes: u64) {
        if self.totals_fixed() {
            return;
        }
        self.total_files.fetch_add(files, Ordering::SeqCst);
        self.total_bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Adds expected bytes only, e.g. a `Content-Length` seen at transfer time.
    ///
    /// Ignored once totals are fixed.
    pub fn add_expected_bytes(&self, bytes: u64) {
        if self.totals_fixed() {
            return;
        }
        self.total_bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Freezes the expected totals; later `add_expected*` calls are no-ops.
    pub fn fix_totals(&self) {
        self.totals_fixed.store(true, Ordering::SeqCst);
    }

    /// Whether the expected totals have been frozen by a count pass.
    #[must_use]
    pub fn totals_fixed(&self) -> bool {
        self.totals_fixed.load(Ordering::SeqCst)
    }

    /// Credits bytes written to disk.
    pub fn record_bytes(&self, bytes: u64) {
        self.downloaded_bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Counts one fully written file.
    pub fn file_completed(&self) {
        self.downloaded_files.fetch_add(1, Ordering::SeqCst);
    }

    /// Counts one file entering the failure ledger.
    pub fn file_failed(&self) {
        self.failed_files.fetch_add(1, Ordering::SeqCst);
    }

    /// Counts one file leaving the failure ledger after a successful retry.
    pub fn failure_cleared(&self) {
        let _ = self
            .failed_files
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Reads the live counters.
    #[must_use]
    pub fn counters(&self) -> ProgressCounters {
        ProgressCounters {
            total_files: self.total_files.load(Ordering::SeqCst),
            total_bytes: self.total_bytes.load(Ordering::SeqCst),
            downloaded_files: self.downloaded_files.load(Ordering::SeqCst),
            downloaded_bytes: self.downloaded_bytes.load(Ordering::SeqCst),
            failed_files: self.failed_files.load(Ordering::SeqCst),
        }
    }

    /// Takes a sample now; see [`Self::sample_at`].
    pub fn sample(&self) -> ProgressSnapshot {
        self.sample_at(Instant::now())
    }

    /// Recomputes derived metrics as of `now` and stores the result as the
    /// latest sample.
    ///
    /// `speed = Δbytes / Δt` since the previous sample; the ETA is the
    /// remaining expected bytes divided by that speed.
    #[allow(clippy::cast_precision_loss)]
    pub fn sample_at(&self, now: Instant) -> ProgressSnapshot {
        let counters = self.counters();

        let (speed, elapsed) = {
            let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
            let dt = now.saturating_duration_since(clock.last_at).as_secs_f64();
            let db = counters.downloaded_bytes.saturating_sub(clock.last_bytes);
            let speed = if dt > 0.0 { db as f64 / dt } else { 0.0 };
            if dt > 0.0 {
                clock.last_at = now;
                clock.last_bytes = counters.downloaded_bytes;
            }
            (speed, now.saturating_duration_since(clock.started_at))
        };

        let eta = (speed > 0.0).then(|| {
            let remaining = counters.total_bytes.saturating_sub(counters.downloaded_bytes);
            Duration::from_secs_f64(remaining as f64 / speed)
        });

        let snapshot = ProgressSnapshot {
            counters,
            speed,
            eta,
            elapsed,
        };
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
        trace!(
            downloaded = counters.downloaded_bytes,
            total = counters.total_bytes,
            speed,
            "progress sampled"
        );
        snapshot
    }

    /// The most recent sample.
    #[must_use]
    pub fn latest(&self) -> ProgressSnapshot {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves the speed baseline to now, so the next sample does not average
    /// over a pause.
    pub fn rebase_sample(&self) {
        let bytes = self.downloaded_bytes.load(Ordering::SeqCst);
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        clock.last_at = Instant::now();
        clock.last_bytes = bytes;
    }

    /// Samples every `period` until `cancel` fires, then takes a final sample.
    pub fn spawn_sampler(
        self: &Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        tracker.sample();
                    }
                }
            }
            tracker.sample();
        })
    }
}
