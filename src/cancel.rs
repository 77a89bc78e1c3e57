//! One-shot cancellation tokens.
//!
//! A [`CancelToken`] is a thread-safe boolean flag that transitions
//! false→true exactly once, with both a polling interface
//! ([`is_cancelled`](CancelToken::is_cancelled)) and a waiting interface
//! ([`wait_handle`](CancelToken::wait_handle)). Tokens are cheap clonable
//! handles: one token may be shared by many tasks and by arbitrary
//! application code.
//!
//! Cancellation is cooperative. Cancelling a token stops nothing by
//! itself; running code must observe the token and wind down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

use crate::sync::Event;
use crate::time::Deadline;

struct TokenInner {
    cancelled: AtomicBool,
    /// Lazily materialised waitable view; racing materialisers agree on a
    /// single instance through the cell.
    event: OnceLock<Event>,
    /// Present only for deadline-armed tokens.
    deadline: Option<Deadline>,
    watcher_armed: AtomicBool,
}

/// A thread-safe one-shot cancellation flag.
///
/// # Example
///
/// ```
/// use uipool::CancelToken;
///
/// let token = CancelToken::new();
/// let shared = token.clone();
/// assert!(!shared.is_cancelled());
/// token.cancel();
/// assert!(shared.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Creates a new, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a token that cancels itself once `deadline` passes.
    ///
    /// Polling never needs a timer: [`is_cancelled`](Self::is_cancelled)
    /// checks the deadline directly. The waitable view is armed with a
    /// one-shot watcher on first [`wait_handle`](Self::wait_handle);
    /// calling [`cancel`](Self::cancel) earlier fires it immediately.
    #[must_use]
    pub fn with_deadline(deadline: Deadline) -> Self {
        Self::build(Some(deadline))
    }

    fn build(deadline: Option<Deadline>) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                event: OnceLock::new(),
                deadline,
                watcher_armed: AtomicBool::new(false),
            }),
        }
    }

    /// Cancels the token. Idempotent.
    ///
    /// The flag write happens-before any subsequent
    /// `is_cancelled() == true` observation on any thread, and before a
    /// waiter on [`wait_handle`](Self::wait_handle) observes the signal.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        if let Some(event) = self.inner.event.get() {
            event.set();
        }
    }

    /// Returns true once the token has been cancelled (or, for a
    /// deadline-armed token, once the deadline has passed).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
            || self.inner.deadline.is_some_and(|d| d.is_elapsed())
    }

    /// Returns the waitable view of this token, materialising it on first
    /// call.
    ///
    /// If the token was already cancelled when the view materialised, the
    /// returned event is set before it is returned, whichever caller won
    /// the materialisation race.
    pub fn wait_handle(&self) -> &Event {
        let event = self.inner.event.get_or_init(Event::new);
        if self.is_cancelled() {
            event.set();
        } else if let Some(deadline) = self.inner.deadline {
            self.arm_watcher(deadline);
        }
        event
    }

    /// Spawns the one-shot expiry watcher, once per token.
    fn arm_watcher(&self, deadline: Deadline) {
        if self.inner.watcher_armed.swap(true, Ordering::AcqRel) {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let spawned = thread::Builder::new()
            .name("uipool-cancel-timer".to_string())
            .spawn(move || {
                if let Some(rem) = deadline.remaining() {
                    thread::sleep(rem);
                }
                if let Some(inner) = weak.upgrade() {
                    inner.cancelled.store(true, Ordering::Release);
                    if let Some(event) = inner.event.get() {
                        event.set();
                    }
                }
            });
        if let Err(err) = spawned {
            // Waiters fall back to the deadline checks in wait loops.
            tracing::warn!(error = %err, "failed to spawn cancel-timer watcher");
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::WaitOutcome;
    use std::time::Duration;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_idempotent_and_visible_to_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn wait_handle_after_cancel_is_pre_set() {
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(
            token.wait_handle().wait(Deadline::from_millis(0)),
            WaitOutcome::Signaled
        );
    }

    #[test]
    fn cancel_signals_a_materialised_handle() {
        let token = CancelToken::new();
        let clone = token.clone();
        let waiter = thread::spawn(move || {
            clone.wait_handle().wait(Deadline::from_millis(2_000))
        });
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Signaled);
    }

    #[test]
    fn racing_materialisers_agree_on_one_event() {
        let token = CancelToken::new();
        let clone = token.clone();
        let other = thread::spawn(move || {
            let _ = clone.wait_handle();
        });
        let first = token.wait_handle() as *const Event;
        other.join().unwrap();
        let second = token.wait_handle() as *const Event;
        assert_eq!(first, second);
    }

    #[test]
    fn deadline_token_cancels_itself() {
        let token = CancelToken::with_deadline(Deadline::from_millis(30));
        assert!(!token.is_cancelled());
        assert_eq!(
            token.wait_handle().wait(Deadline::from_millis(2_000)),
            WaitOutcome::Signaled
        );
        assert!(token.is_cancelled());
    }

    #[test]
    fn deadline_token_fires_early_on_explicit_cancel() {
        let token = CancelToken::with_deadline(Deadline::from_millis(60_000));
        let handle = token.wait_handle();
        token.cancel();
        assert_eq!(handle.wait(Deadline::from_millis(100)), WaitOutcome::Signaled);
    }
}
