//! Task error classification for the background queue.
//!
//! Handlers wrap failures in [`TaskError`] to tell the queue whether a retry
//! can help. Errors not wrapped in `TaskError` are treated as recoverable.

use std::fmt;

/// An error from a task handler, tagged with retryability.
#[derive(Debug)]
pub struct TaskError {
    recoverable: bool,
    inner: anyhow::Error,
}

impl TaskError {
    /// A transient failure; the queue may retry the task.
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            recoverable: true,
            inner: err.into(),
        }
    }

    /// A permanent failure (bad input, missing record); retrying cannot help.
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            recoverable: false,
            inner: err.into(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref())
    }
}
