//! Error types for pool, task, and dispatcher operations.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Panics inside task actions are isolated at the worker boundary and
//!   captured as a `Failed` task, never propagated out of a worker
//! - The abort sentinel is control flow, not a failure: a task action that
//!   returns [`Error::Aborted`] completed voluntarily

use std::io;
use thiserror::Error;

/// The main error type for uipool operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The action ended early on purpose.
    ///
    /// Returned by a task action to signal voluntary completion, typically
    /// after observing its cancellation token. The worker boundary maps it
    /// to [`TaskState::Completed`](crate::TaskState::Completed); it is
    /// never stored as a task failure.
    #[error("aborted")]
    Aborted,

    /// Arbitrary failure raised by application code inside a task action.
    ///
    /// Displays as its message alone, so the text a task captures is the
    /// text the action produced.
    #[error("{0}")]
    App(String),

    /// A task action failed; carries the captured failure description.
    ///
    /// Raised by [`TaskHandle::join`](crate::TaskHandle::join) on a failed
    /// task. Only the message text survives the thread boundary: the
    /// concrete failure object is not reconstructible across it.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// The platform refused to create a worker thread.
    ///
    /// Raised synchronously from `submit`. The newly queued task stays in
    /// the queue and may still be dispatched to an existing worker.
    #[error("worker thread spawn failed: {source}")]
    ThreadSpawn {
        /// The underlying spawn error.
        #[from]
        source: io::Error,
    },

    /// A UI dispatcher is already installed for this process.
    #[error("ui dispatcher already installed")]
    DispatcherInstalled,
}

impl Error {
    /// Creates an application failure from any message.
    #[must_use]
    pub fn app(message: impl Into<String>) -> Self {
        Self::App(message.into())
    }

    /// Returns true for the voluntary-completion sentinel.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Returns true for a captured task failure.
    #[must_use]
    pub const fn is_task_failure(&self) -> bool {
        matches!(self, Self::TaskFailed(_))
    }
}

/// A specialized Result type for uipool operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_task_failure_carries_message() {
        let err = Error::TaskFailed("boom".to_string());
        assert_eq!(err.to_string(), "task failed: boom");
        assert!(err.is_task_failure());
        assert!(!err.is_aborted());
    }

    #[test]
    fn app_failure_displays_its_message_alone() {
        let err = Error::app("boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn abort_sentinel_is_not_a_failure() {
        let err = Error::Aborted;
        assert!(err.is_aborted());
        assert!(!err.is_task_failure());
    }

    #[test]
    fn spawn_error_wraps_io_source() {
        let io_err = io::Error::new(io::ErrorKind::WouldBlock, "thread limit");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::ThreadSpawn { .. }));
        assert!(err.to_string().contains("thread limit"));
    }
}
