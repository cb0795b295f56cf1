use std::fmt;

/// Lifecycle state of a [`super::SessionController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionRunState {
    /// No session has started yet.
    #[default]
    Idle,
    /// The count pass is walking the tree.
    Counting,
    /// Files are being transferred or retried.
    Downloading,
    /// Transfers are held at their next chunk boundary.
    Paused,
    /// Cancellation was requested; spawned work is winding down.
    Cancelling,
    /// Every discovered file was downloaded.
    Completed,
    /// Finished with files still failing after all retries.
    CompletedWithFailures,
    /// Stopped by cancellation.
    Cancelled,
}

impl SessionRunState {
    /// States in which a session is running and `start` is rejected.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Counting | Self::Downloading | Self::Paused | Self::Cancelling
        )
    }

    /// States a session settles in once all its work has returned.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithFailures | Self::Cancelled
        )
    }
}

impl fmt::Display for SessionRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Counting => "counting",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Cancelling => "cancelling",
            Self::Completed => "completed",
            Self::CompletedWithFailures => "completed with failures",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Final result of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// All discovered files were downloaded.
    Completed {
        /// Files downloaded.
        files: u64,
    },
    /// Some files still failed after all retry rounds.
    CompletedWithFailures {
        /// Files downloaded.
        files: u64,
        /// Files still failing.
        failed: u64,
    },
    /// The session was cancelled.
    Cancelled {
        /// Files fully saved before cancellation.
        files: u64,
    },
}

impl SessionOutcome {
    /// The terminal run state matching this outcome.
    #[must_use]
    pub fn state(&self) -> SessionRunState {
        match self {
            Self::Completed { .. } => SessionRunState::Completed,
            Self::CompletedWithFailures { .. } => SessionRunState::CompletedWithFailures,
            Self::Cancelled { .. } => SessionRunState::Cancelled,
        }
    }

    /// Human-readable final status line.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Completed { files } => format!("Completed: {files} files"),
            Self::CompletedWithFailures { failed, .. } => {
                format!("Completed with {failed} failed downloads")
            }
            Self::Cancelled { files } => format!("Cancelled: {files} files saved"),
        }
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
