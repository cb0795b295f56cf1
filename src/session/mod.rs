//! Session orchestration: count pass, download pass, retries, final status.
//!
//! ```text
//! Idle -> Counting -> Downloading <-> Paused -> Completed | CompletedWithFailures
//!            \             \            \
//!             +-------------+------------+--> Cancelling -> Cancelled
//! ```
//!
//! [`SessionController::start`] validates and prepares the configuration, then
//! spawns one worker task that drives the whole session. Pause, resume and
//! cancel act on the session's [`SessionControls`] and take effect at the next
//! chunk, entry or round boundary of the spawned work.

mod state;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

pub use state::{SessionOutcome, SessionRunState};

use crate::config::{ConfigError, SessionConfig};
use crate::control::SessionControls;
use crate::crawl::{CrawlMode, Crawler};
use crate::download::{
    DEFAULT_CONCURRENCY, HttpClient, MAX_CONCURRENCY, MIN_CONCURRENCY, TransferEngine,
};
use crate::history::{HistoryEvent, HistorySink, HistoryStatus, SYSTEM_URL};
use crate::progress::{DEFAULT_SAMPLE_PERIOD, ProgressCounters, ProgressSnapshot, ProgressTracker};
use crate::retry::{FailureLedger, FailureRecord, RetryPolicy, RetryQueue, RetryReport};

/// Errors rejecting a controller or a session start.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `start` was called while a session is running.
    #[error("a session is already active (state: {state})")]
    AlreadyActive {
        /// The state at the time of the call.
        state: SessionRunState,
    },

    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The session configuration could not be prepared.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Engine tuning shared by every session of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Transfers in flight during the download pass; 1 is fully sequential.
    pub concurrency: usize,
    /// Retry rounds and delay.
    pub retry: RetryPolicy,
    /// Period of progress sampling.
    pub sample_period: Duration,
    /// Skip the count pass; totals then grow as files are discovered.
    pub skip_count_pass: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            sample_period: DEFAULT_SAMPLE_PERIOD,
            skip_count_pass: false,
        }
    }
}

/// State shared between the controller and its worker task.
struct Shared {
    state: watch::Sender<SessionRunState>,
    status: Mutex<String>,
    controls: Mutex<SessionControls>,
    ledger: Mutex<Option<Arc<FailureLedger>>>,
    retry_report: Mutex<RetryReport>,
    outcome: Mutex<Option<SessionOutcome>>,
    worker: Mutex<Option<JoinHandle<SessionOutcome>>>,
}

impl Shared {
    fn set_status(&self, message: impl Into<String>) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = message.into();
    }

    fn controls(&self) -> SessionControls {
        self.controls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the per-session state left by the previous session.
    fn install(&self, controls: SessionControls, ledger: Arc<FailureLedger>) {
        *self.controls.lock().unwrap_or_else(PoisonError::into_inner) = controls;
        *self.ledger.lock().unwrap_or_else(PoisonError::into_inner) = Some(ledger);
        *self.retry_report.lock().unwrap_or_else(PoisonError::into_inner) =
            RetryReport::default();
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Moves `from -> to` only if the current state is `from`.
    fn transition(&self, from: SessionRunState, to: SessionRunState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

/// Runs crawl-and-download sessions, one at a time.
pub struct SessionController {
    client: HttpClient,
    options: SessionOptions,
    history: Arc<dyn HistorySink>,
    progress: Arc<ProgressTracker>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("options", &self.options)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Creates an idle controller.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConcurrency`] if `options.concurrency`
    /// is outside `1..=32`.
    #[instrument(level = "debug", skip(client, history))]
    pub fn new(
        client: HttpClient,
        options: SessionOptions,
        history: Arc<dyn HistorySink>,
    ) -> Result<Self, SessionError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&options.concurrency) {
            return Err(SessionError::InvalidConcurrency {
                value: options.concurrency,
            });
        }
        let (state, _) = watch::channel(SessionRunState::Idle);
        Ok(Self {
            client,
            options,
            history,
            progress: Arc::new(ProgressTracker::new()),
            shared: Arc::new(Shared {
                state,
                status: Mutex::new(String::new()),
                controls: Mutex::new(SessionControls::new()),
                ledger: Mutex::new(None),
                retry_report: Mutex::new(RetryReport::default()),
                outcome: Mutex::new(None),
                worker: Mutex::new(None),
            }),
        })
    }

    /// Starts a session in the background.
    ///
    /// Accepted from `Idle` and from any terminal state. The destination root
    /// is created before any request is made; if that fails the state is left
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyActive`] while a session is running and
    /// [`SessionError::Config`] if the destination cannot be created.
    #[instrument(skip(self, config), fields(base = %config.base_url()))]
    pub fn start(&self, config: SessionConfig) -> Result<(), SessionError> {
        let current = self.state();
        if current.is_active() {
            return Err(SessionError::AlreadyActive { state: current });
        }
        config.prepare_destination()?;

        let controls = SessionControls::new();
        let ledger = Arc::new(FailureLedger::new(Arc::clone(&self.progress)));
        let mut rejected = None;
        // Installed under the state lock: a control call that observes
        // `Counting` always acts on this session's controls.
        self.shared.state.send_if_modified(|state| {
            if state.is_active() {
                rejected = Some(*state);
                return false;
            }
            self.shared.install(controls.clone(), Arc::clone(&ledger));
            self.progress.reset();
            self.shared
                .set_status(format!("Counting files from: {}", config.base_url()));
            *state = SessionRunState::Counting;
            true
        });
        if let Some(state) = rejected {
            return Err(SessionError::AlreadyActive { state });
        }

        info!(
            destination = %config.destination_root().display(),
            max_depth = config.max_depth(),
            extensions = %config.extensions(),
            "session started"
        );

        let worker = Worker {
            client: self.client.clone(),
            options: self.options,
            config: Arc::new(config),
            progress: Arc::clone(&self.progress),
            ledger,
            history: Arc::clone(&self.history),
            controls,
            shared: Arc::clone(&self.shared),
        };
        let handle = tokio::spawn(worker.run());
        *self
            .shared
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Holds all transfers at their next chunk boundary.
    ///
    /// Only acts while `Downloading`; returns true if the session was paused.
    pub fn pause(&self) -> bool {
        let paused = self.shared.state.send_if_modified(|state| {
            if *state == SessionRunState::Downloading && self.shared.controls().pause() {
                *state = SessionRunState::Paused;
                true
            } else {
                false
            }
        });
        if paused {
            self.shared.set_status("Download paused");
            info!("session paused");
        }
        paused
    }

    /// Releases paused transfers.
    ///
    /// Only acts while `Paused`; returns true if the session was resumed.
    pub fn resume(&self) -> bool {
        let resumed = self.shared.state.send_if_modified(|state| {
            if *state == SessionRunState::Paused {
                self.shared.controls().resume();
                *state = SessionRunState::Downloading;
                true
            } else {
                false
            }
        });
        if resumed {
            self.progress.rebase_sample();
            self.shared.set_status("Resuming download...");
            info!("session resumed");
        }
        resumed
    }

    /// Requests cancellation of the running session.
    ///
    /// Moves an active session to `Cancelling`, releases paused transfers and
    /// signals the crawl, transfers and retries. The session settles in
    /// `Cancelled` once all of them have returned. Returns false if no session
    /// was running.
    pub fn cancel(&self) -> bool {
        let cancelling = self.shared.state.send_if_modified(|state| {
            if matches!(
                *state,
                SessionRunState::Counting | SessionRunState::Downloading | SessionRunState::Paused
            ) {
                self.shared.controls().cancel();
                *state = SessionRunState::Cancelling;
                true
            } else {
                false
            }
        });
        if cancelling {
            self.shared.set_status("Cancelling download...");
            let saved = self.progress.counters().downloaded_bytes;
            self.history
                .record(HistoryEvent::now(SYSTEM_URL, HistoryStatus::Cancelled, saved));
            info!("session cancelling");
        }
        cancelling
    }

    /// Current run state.
    #[must_use]
    pub fn state(&self) -> SessionRunState {
        *self.shared.state.borrow()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionRunState> {
        self.shared.state.subscribe()
    }

    /// The last progress sample.
    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.latest()
    }

    /// Live counters, bypassing the sampler.
    #[must_use]
    pub fn counters(&self) -> ProgressCounters {
        self.progress.counters()
    }

    /// Human-readable status line for the current state.
    #[must_use]
    pub fn status_message(&self) -> String {
        self.shared
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Tasks currently in the failure ledger of the latest session.
    #[must_use]
    pub fn failures(&self) -> Vec<FailureRecord> {
        self.shared
            .ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|ledger| ledger.snapshot())
            .unwrap_or_default()
    }

    /// Retry rounds of the latest session.
    #[must_use]
    pub fn retry_report(&self) -> RetryReport {
        self.shared
            .retry_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Outcome of the latest finished session, if any.
    #[must_use]
    pub fn outcome(&self) -> Option<SessionOutcome> {
        *self
            .shared
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for the running session to finish and returns its outcome.
    ///
    /// Returns the stored outcome if the session already finished, and `None`
    /// if no session was ever started.
    pub async fn wait(&self) -> Option<SessionOutcome> {
        let handle = self
            .shared
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            match handle.await {
                Ok(outcome) => return Some(outcome),
                Err(e) => warn!(error = %e, "session worker did not complete"),
            }
        }
        self.outcome()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shared.controls().cancel();
    }
}

struct Worker {
    client: HttpClient,
    options: SessionOptions,
    config: Arc<SessionConfig>,
    progress: Arc<ProgressTracker>,
    ledger: Arc<FailureLedger>,
    history: Arc<dyn HistorySink>,
    controls: SessionControls,
    shared: Arc<Shared>,
}

impl Worker {
    #[instrument(skip_all, fields(base = %self.config.base_url()))]
    async fn run(self) -> SessionOutcome {
        let sampler_stop = CancellationToken::new();
        let sampler = self
            .progress
            .spawn_sampler(self.options.sample_period, sampler_stop.clone());

        let mut outcome = self.drive().await;

        sampler_stop.cancel();
        if let Err(e) = sampler.await {
            warn!(error = %e, "progress sampler did not complete");
        }

        // A cancel accepted after the work finished still settles as cancelled.
        self.shared.state.send_modify(|state| {
            if self.controls.is_cancelled() {
                outcome = self.cancelled();
            }
            *self
                .shared
                .outcome
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(outcome);
            self.shared.set_status(outcome.message());
            *state = outcome.state();
        });
        info!(outcome = %outcome, "session finished");
        outcome
    }

    async fn drive(&self) -> SessionOutcome {
        let crawler = Crawler::new(
            self.client.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.progress),
        );

        if !self.options.skip_count_pass {
            let summary = crawler.count(self.controls.token().clone()).await;
            if self.controls.is_cancelled() {
                return self.cancelled();
            }
            self.progress.fix_totals();
            info!(
                files = summary.files_discovered,
                bytes = summary.bytes_probed,
                "count pass finished"
            );
            if summary.files_discovered == 0 {
                return SessionOutcome::Completed { files: 0 };
            }
        }

        self.shared
            .transition(SessionRunState::Counting, SessionRunState::Downloading);
        if self.options.skip_count_pass {
            self.shared.set_status("Downloading files...");
        } else {
            let total = self.progress.counters().total_files;
            self.shared.set_status(format!("Downloading {total} files..."));
        }

        let engine = TransferEngine::new(
            self.client.clone(),
            self.config.destination_root(),
            Arc::clone(&self.progress),
            Arc::clone(&self.ledger),
            Arc::clone(&self.history),
        );
        let crawl = crawler.crawl(CrawlMode::Collect, self.controls.token().clone());
        engine
            .run_pass(crawl, &self.controls, self.options.concurrency)
            .await;
        if self.controls.is_cancelled() {
            return self.cancelled();
        }

        let queue = RetryQueue::new(self.options.retry, engine);
        let shared = Arc::clone(&self.shared);
        let report = queue
            .run_observed(&self.controls, move |round, max_rounds| {
                shared.set_status(format!(
                    "Retrying failed downloads (attempt {round}/{max_rounds})..."
                ));
            })
            .await;
        *self
            .shared
            .retry_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = report;
        if self.controls.is_cancelled() {
            return self.cancelled();
        }

        let files = self.progress.counters().downloaded_files;
        let failed = self.ledger.len() as u64;
        if failed == 0 {
            SessionOutcome::Completed { files }
        } else {
            SessionOutcome::CompletedWithFailures { files, failed }
        }
    }

    fn cancelled(&self) -> SessionOutcome {
        SessionOutcome::Cancelled {
            files: self.progress.counters().downloaded_files,
        }
    }
}
