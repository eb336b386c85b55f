// ABOUTME: Defines the error type shared by the debounce and throttle coordinators.
// ABOUTME: Errors are Clone so a single outcome can be broadcast to every waiter.

use std::sync::Arc;

/// Result of a coordinated execution, as observed by every caller of a batch.
pub type Outcome<T> = Result<T, CoordinatorError>;

/// Errors surfaced by coordinators and result cells.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoordinatorError {
    /// The coordinator was disposed before the call was made.
    #[error("coordinator has been disposed")]
    Disposed,

    /// The caller's own cancellation signal fired while it was waiting.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller gave up waiting after the requested timeout.
    #[error("timed out waiting for result")]
    Timeout,

    /// The work item returned an error or panicked.
    #[error("work failed: {0}")]
    WorkFailed(Arc<anyhow::Error>),

    /// A background task was required but no tokio runtime is running.
    #[error("no tokio runtime available to schedule work")]
    NoRuntime,
}

impl CoordinatorError {
    pub(crate) fn work_failed(error: anyhow::Error) -> Self {
        CoordinatorError::WorkFailed(Arc::new(error))
    }

    /// Returns true if this error came from the work item itself.
    pub fn is_work_failure(&self) -> bool {
        matches!(self, CoordinatorError::WorkFailed(_))
    }
}
