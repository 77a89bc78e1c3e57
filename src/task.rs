//! Task lifecycle: state machine, failure capture, completion signalling.
//!
//! A [`Task`] encapsulates one submission to a pool: the action, the
//! effective cancellation token, the monotone terminal-state machine, the
//! captured failure text, and the lazily created completion [`Event`].
//! Submitters observe it through a clonable [`TaskHandle`].
//!
//! # State machine
//!
//! `Pending → Completed | Failed | Discarded`, exactly once. The terminal
//! state is stored with release ordering and the completion event is set
//! after it, so any observer woken by the event reads a terminal state.
//!
//! # Failure capture
//!
//! Failures never leave a worker. An action that returns `Err` (other
//! than the [`Error::Aborted`] sentinel) or panics ends `Failed`, with a
//! textual description retained on the task; the sentinel and normal
//! return both end `Completed`.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::sync::{Event, WaitOutcome};
use crate::time::Deadline;
use crate::ui::UiDispatcher;

/// Boxed unit of work run on a pool worker.
///
/// Returning `Ok(())` or [`Error::Aborted`] completes the task; any other
/// error (or a panic) fails it with a captured description.
pub type TaskFn = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Lifecycle state of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Queued or currently executing.
    Pending = 0,
    /// The action returned normally, or aborted voluntarily.
    Completed = 1,
    /// The action failed; a description is retained on the task.
    Failed = 2,
    /// Accepted administratively but never executed because the pool was
    /// tearing down.
    Discarded = 3,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Completed,
            2 => Self::Failed,
            3 => Self::Discarded,
            _ => Self::Pending,
        }
    }

    /// Returns true for any state other than `Pending`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One submitted unit of work. Shared between the submitter's handle, the
/// pool queue, and the executing worker via `Arc`.
pub(crate) struct Task {
    action: Mutex<Option<TaskFn>>,
    cancel: CancelToken,
    state: AtomicU8,
    failure: Mutex<Option<String>>,
    done: OnceLock<Event>,
}

impl Task {
    pub(crate) fn new(action: TaskFn, cancel: CancelToken) -> Arc<Self> {
        Arc::new(Self {
            action: Mutex::new(Some(action)),
            cancel,
            state: AtomicU8::new(TaskState::Pending as u8),
            failure: Mutex::new(None),
            done: OnceLock::new(),
        })
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Runs the action on the calling worker thread.
    ///
    /// Precondition: state is `Pending` and this worker owns the task
    /// (it was just dequeued). The action reference is dropped as soon as
    /// execution ends so captured resources release promptly.
    pub(crate) fn execute(&self) {
        let Some(action) = self.take_action() else {
            return;
        };
        let (state, failure) = match catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(())) => (TaskState::Completed, None),
            Ok(Err(err)) if err.is_aborted() => (TaskState::Completed, None),
            Ok(Err(err)) => (TaskState::Failed, Some(err.to_string())),
            Err(payload) => (TaskState::Failed, Some(panic_message(payload.as_ref()))),
        };
        if state == TaskState::Failed {
            tracing::warn!(
                failure = failure.as_deref().unwrap_or_default(),
                "task action failed"
            );
        }
        self.finish(state, failure);
    }

    /// Marks the task `Discarded` without running it.
    ///
    /// Precondition: state is `Pending` and the task is no longer queued.
    pub(crate) fn discard(&self) {
        drop(self.take_action());
        self.finish(TaskState::Discarded, None);
    }

    /// Publishes the terminal state, then fires the completion signal.
    fn finish(&self, state: TaskState, failure: Option<String>) {
        if let Some(message) = failure {
            *lock_recover(&self.failure) = Some(message);
        }
        self.state.store(state as u8, Ordering::Release);
        if let Some(done) = self.done.get() {
            done.set();
        }
    }

    fn take_action(&self) -> Option<TaskFn> {
        lock_recover(&self.action).take()
    }

    /// The completion event, materialised on first call; pre-set if the
    /// task already finished, whichever caller won the race.
    fn completion(&self) -> &Event {
        let done = self.done.get_or_init(Event::new);
        if self.state().is_terminal() {
            done.set();
        }
        done
    }
}

/// Clonable observer handle for one submitted task.
///
/// The handle never controls execution; it snapshots state, exposes the
/// effective cancellation token, and waits for completion.
#[derive(Clone)]
pub struct TaskHandle {
    task: Arc<Task>,
}

impl TaskHandle {
    pub(crate) fn new(task: Arc<Task>) -> Self {
        Self { task }
    }

    /// Snapshot of the task state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    /// The effective cancellation token: the one supplied at submission,
    /// or the task's own embedded token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.task.cancel
    }

    /// The captured failure description, `Some` iff the task `Failed`.
    #[must_use]
    pub fn failure(&self) -> Option<String> {
        lock_recover(&self.task.failure).clone()
    }

    /// The completion event, materialised on first call.
    #[must_use]
    pub fn complete_handle(&self) -> &Event {
        self.task.completion()
    }

    /// Blocks until the task reaches a terminal state or the deadline
    /// elapses; returns false on timeout.
    ///
    /// When called on the UI thread with a [`UiDispatcher`] installed, the
    /// wait routes through [`UiDispatcher::modal_wait`] so paint, timer,
    /// and thread-posted messages keep flowing. Everywhere else it is a
    /// passive wait on the completion event.
    pub fn wait(&self, deadline: Deadline) -> bool {
        if self.task.state().is_terminal() {
            return true;
        }
        let done = self.task.completion();
        if let Some(dispatcher) = UiDispatcher::current() {
            if dispatcher.is_ui_thread() {
                return dispatcher.modal_wait(&[done], deadline).is_some();
            }
        }
        done.wait(deadline) == WaitOutcome::Signaled
    }

    /// Like [`wait`](Self::wait), then surfaces a `Failed` task as
    /// [`Error::TaskFailed`] carrying the captured description.
    ///
    /// Only the text is carried: the concrete failure object cannot be
    /// re-materialised across the thread boundary.
    pub fn join(&self, deadline: Deadline) -> Result<bool> {
        let finished = self.wait(deadline);
        if finished && self.state() == TaskState::Failed {
            return Err(Error::TaskFailed(self.failure().unwrap_or_default()));
        }
        Ok(finished)
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("state", &self.state())
            .field("cancelled", &self.cancel_token().is_cancelled())
            .finish()
    }
}

/// Renders a panic payload as text, for capture into a task failure.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}

fn lock_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_task(action: impl FnOnce() -> Result<()> + Send + 'static) -> Arc<Task> {
        Task::new(Box::new(action), CancelToken::new())
    }

    #[test]
    fn execute_publishes_completed() {
        let task = make_task(|| Ok(()));
        assert_eq!(task.state(), TaskState::Pending);
        task.execute();
        assert_eq!(task.state(), TaskState::Completed);
        assert!(lock_recover(&task.failure).is_none());
    }

    #[test]
    fn execute_captures_error_text() {
        let task = make_task(|| Err(Error::app("boom")));
        task.execute();
        assert_eq!(task.state(), TaskState::Failed);
        let handle = TaskHandle::new(task);
        assert_eq!(handle.failure().as_deref(), Some("boom"));
    }

    #[test]
    fn abort_sentinel_counts_as_completion() {
        let task = make_task(|| Err(Error::Aborted));
        task.execute();
        assert_eq!(task.state(), TaskState::Completed);
        assert!(TaskHandle::new(task).failure().is_none());
    }

    #[test]
    fn panic_is_captured_not_propagated() {
        let task = make_task(|| panic!("kaboom"));
        task.execute();
        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(TaskHandle::new(task).failure().as_deref(), Some("kaboom"));
    }

    #[test]
    fn discard_drops_the_action_without_running_it() {
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let task = make_task(move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        task.discard();
        assert_eq!(task.state(), TaskState::Discarded);
        assert!(!ran.load(Ordering::SeqCst));
        assert!(lock_recover(&task.action).is_none());
    }

    #[test]
    fn completion_handle_is_pre_set_after_finish() {
        let task = make_task(|| Ok(()));
        task.execute();
        let handle = TaskHandle::new(task);
        assert_eq!(
            handle.complete_handle().wait(Deadline::from_millis(0)),
            WaitOutcome::Signaled
        );
    }

    #[test]
    fn completion_handle_fires_on_finish() {
        let task = make_task(|| Ok(()));
        let handle = TaskHandle::new(Arc::clone(&task));
        let done = handle.complete_handle();
        assert!(!done.is_set());
        task.execute();
        assert_eq!(done.wait(Deadline::from_millis(0)), WaitOutcome::Signaled);
    }

    #[test]
    fn join_surfaces_failure_message() {
        let task = make_task(|| Err(Error::app("bad")));
        task.execute();
        let handle = TaskHandle::new(task);
        let err = handle.join(Deadline::from_millis(10)).unwrap_err();
        assert!(err.is_task_failure());
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn join_times_out_cleanly_on_pending_task() {
        let task = make_task(|| Ok(()));
        let handle = TaskHandle::new(task);
        assert!(!handle.join(Deadline::from_millis(20)).unwrap());
        assert_eq!(handle.state(), TaskState::Pending);
    }

    #[test]
    fn states_are_monotone_under_observation() {
        let task = make_task(|| Ok(()));
        task.execute();
        let first = task.state();
        for _ in 0..100 {
            assert_eq!(task.state(), first);
        }
    }
}
