use std::time::Duration;
use thiserror::Error;

/// Outcome of a unit of work that did not produce a value.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ExecError {
    /// The task panicked or returned an error.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// A bounded wait elapsed before the work finished.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The task was cancelled before it finished.
    #[error("task cancelled")]
    Cancelled,

    /// The blocking thread running the task went away without reporting.
    #[error("worker interrupted before the task reported")]
    Interrupted,

    /// Submission rejected because the target is shutting down.
    #[error("{0} is closed")]
    Closed(String),

    /// `await_submit` called from inside the lane it targets.
    #[error("re-entrant wait on lane {0}")]
    Reentrant(String),
}
