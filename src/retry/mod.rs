//! Bounded, round-based retry of failed transfers.
//!
//! After the download pass, every task in the [`FailureLedger`] is retried in
//! rounds. Each round waits a fixed delay, then retries every task currently in
//! the ledger once, sequentially. Tasks that succeed leave the ledger; tasks
//! that fail again stay for the next round. After `max_rounds` rounds the
//! remaining failures are reported, never retried further. There is no
//! exponential backoff.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use dirpull::retry::RetryPolicy;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.max_rounds, 3);
//! assert_eq!(policy.delay, Duration::from_secs(5));
//! ```

mod ledger;

use std::time::Duration;

use tracing::{info, instrument};
use url::Url;

pub use ledger::{FailureLedger, FailureRecord};

use crate::control::SessionControls;
use crate::download::{TransferEngine, TransferOutcome};

/// Default number of retry rounds.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before each retry round.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// How many retry rounds to run and how long to wait before each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of rounds; 0 disables retries.
    pub max_rounds: u32,
    /// Fixed wait before every round.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(max_rounds: u32, delay: Duration) -> Self {
        Self { max_rounds, delay }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

/// What happened in one retry round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRound {
    /// 1-based round number.
    pub round: u32,
    /// Source URLs retried in this round, in order.
    pub attempted: Vec<Url>,
    /// Tasks that succeeded in this round.
    pub recovered: usize,
    /// Tasks still in the ledger after this round.
    pub remaining: usize,
}

/// Outcome of all retry rounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryReport {
    /// Rounds that ran, in order.
    pub rounds: Vec<RetryRound>,
    /// Whether retrying stopped because of cancellation.
    pub cancelled: bool,
}

impl RetryReport {
    /// How many times `url` was retried across all rounds.
    #[must_use]
    pub fn attempts_for(&self, url: &Url) -> usize {
        self.rounds
            .iter()
            .map(|round| round.attempted.iter().filter(|u| *u == url).count())
            .sum()
    }
}

/// Drives retry rounds over an engine's failure ledger.
#[derive(Debug, Clone)]
pub struct RetryQueue {
    policy: RetryPolicy,
    engine: TransferEngine,
}

impl RetryQueue {
    /// Creates a retry queue for the engine's ledger.
    #[must_use]
    pub fn new(policy: RetryPolicy, engine: TransferEngine) -> Self {
        Self { policy, engine }
    }

    /// Runs retry rounds until the ledger is empty, the rounds are used up,
    /// or cancellation is requested.
    pub async fn run(&self, controls: &SessionControls) -> RetryReport {
        self.run_observed(controls, |_, _| {}).await
    }

    /// Like [`Self::run`], calling `on_round(round, max_rounds)` as each round
    /// begins its delay.
    #[instrument(skip_all, fields(max_rounds = self.policy.max_rounds))]
    pub async fn run_observed(
        &self,
        controls: &SessionControls,
        mut on_round: impl FnMut(u32, u32) + Send,
    ) -> RetryReport {
        let ledger = self.engine.ledger();
        let mut report = RetryReport::default();

        for round in 1..=self.policy.max_rounds {
            if ledger.is_empty() || controls.is_cancelled() {
                break;
            }
            on_round(round, self.policy.max_rounds);
            info!(round, pending = ledger.len(), delay = ?self.policy.delay, "retry round scheduled");

            tokio::select! {
                () = controls.cancelled() => break,
                () = tokio::time::sleep(self.policy.delay) => {}
            }

            let mut attempted = Vec::new();
            let mut recovered = 0;
            for record in ledger.snapshot() {
                if controls.is_cancelled() {
                    break;
                }
                attempted.push(record.task.source_url().clone());
                match self.engine.retry(&record, controls).await {
                    TransferOutcome::Completed { .. } => recovered += 1,
                    TransferOutcome::Failed { .. } | TransferOutcome::Cancelled { .. } => {}
                }
            }

            let remaining = ledger.len();
            info!(round, recovered, remaining, "retry round finished");
            report.rounds.push(RetryRound {
                round,
                attempted,
                recovered,
                remaining,
            });
        }

        report.cancelled = controls.is_cancelled();
        report
    }
}
