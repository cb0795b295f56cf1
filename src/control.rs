//! Cooperative cancellation and pause gate shared by all work of one session.
//!
//! Every spawned unit (crawl, transfers, retries, sampler) holds a clone of
//! [`SessionControls`]. Cancellation is a [`CancellationToken`]; pausing is a
//! `watch` channel that transfers consult between chunks. Cancelling also
//! releases the gate so paused transfers wake up and observe the cancellation.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cancellation token plus pause gate.
///
/// Cheap to clone; all clones share the same state. A new value is created
/// for every session because a cancelled token cannot be reset.
#[derive(Debug, Clone)]
pub struct SessionControls {
    cancel: CancellationToken,
    paused: Arc<watch::Sender<bool>>,
}

impl Default for SessionControls {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionControls {
    /// Creates controls in the running, not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            paused: Arc::new(paused),
        }
    }

    /// Requests cancellation and opens the pause gate.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.paused.send_replace(false);
        debug!("cancellation requested");
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes once cancellation is requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// The underlying token, for `select!` arms that need an owned future.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Closes the pause gate. Returns true if this call changed the state.
    ///
    /// Ignored once cancellation has been requested.
    pub fn pause(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.paused.send_if_modified(|paused| !std::mem::replace(paused, true))
    }

    /// Opens the pause gate. Returns true if this call changed the state.
    pub fn resume(&self) -> bool {
        self.paused.send_if_modified(|paused| std::mem::replace(paused, false))
    }

    /// Whether the gate is currently closed.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Waits while the gate is closed.
    ///
    /// Returns `true` when work may continue and `false` when cancellation was
    /// requested, either before the call or while waiting.
    pub async fn wait_until_running(&self) -> bool {
        let mut gate = self.paused.subscribe();
        loop {
            if self.is_cancelled() {
                return false;
            }
            if !*gate.borrow_and_update() {
                return true;
            }
            tokio::select! {
                () = self.cancel.cancelled() => return false,
                changed = gate.changed() => {
                    if changed.is_err() {
                        return !self.is_cancelled();
                    }
                }
            }
        }
    }
}
