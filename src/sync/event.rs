//! Manual-reset event with deadline-bounded waiting.
//!
//! [`Event`] stays signalled once [`set`](Event::set) until explicitly
//! [`reset`](Event::reset). Waiters can block on a single event or on any
//! of several ([`Event::wait_any`]), always against an absolute
//! [`Deadline`].
//!
//! Each blocking call registers a private waiter record (its own mutex and
//! condvar) with every event it watches; `set` drains the registered
//! waiters under the event lock and wakes them outside it. The `set` write
//! happens-before a waiter observing [`WaitOutcome::Signaled`].

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::time::Deadline;

/// Outcome of a deadline-bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The event was signalled before the deadline.
    Signaled,
    /// The deadline elapsed first.
    TimedOut,
}

/// Per-wait record shared between one waiter and the events it watches.
///
/// The slot holds the index of the first event that woke this waiter;
/// later notifications keep the first index.
struct Waiter {
    slot: Mutex<Option<usize>>,
    cv: Condvar,
}

impl Waiter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(None),
            cv: Condvar::new(),
        })
    }

    fn notify(&self, index: usize) {
        let mut slot = lock_recover(&self.slot);
        if slot.is_none() {
            *slot = Some(index);
        }
        self.cv.notify_one();
    }

    fn wait(&self, deadline: Deadline) -> Option<usize> {
        let mut slot = lock_recover(&self.slot);
        loop {
            if let Some(index) = *slot {
                return Some(index);
            }
            match deadline.remaining() {
                None => {
                    slot = self
                        .cv
                        .wait(slot)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(rem) if rem.is_zero() => return None,
                Some(rem) => {
                    let (guard, _timeout) = self
                        .cv
                        .wait_timeout(slot, rem)
                        .unwrap_or_else(PoisonError::into_inner);
                    slot = guard;
                }
            }
        }
    }
}

struct EventState {
    set: bool,
    waiters: Vec<(Arc<Waiter>, usize)>,
}

/// A manual-reset event.
///
/// # Example
///
/// ```
/// use uipool::{Deadline, Event, WaitOutcome};
///
/// let event = Event::new();
/// event.set();
/// assert_eq!(event.wait(Deadline::from_millis(10)), WaitOutcome::Signaled);
/// ```
pub struct Event {
    state: Mutex<EventState>,
}

impl Event {
    /// Creates a new event in the unset state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EventState {
                set: false,
                waiters: Vec::new(),
            }),
        }
    }

    /// Signals the event, waking every registered waiter. Idempotent.
    pub fn set(&self) {
        let drained = {
            let mut state = self.lock_state();
            state.set = true;
            std::mem::take(&mut state.waiters)
        };
        // Wake outside the event lock.
        for (waiter, index) in drained {
            waiter.notify(index);
        }
    }

    /// Returns the event to the unset state. Registered waiters keep
    /// waiting for the next [`set`](Self::set).
    pub fn reset(&self) {
        self.lock_state().set = false;
    }

    /// Returns true if the event is currently signalled.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.lock_state().set
    }

    /// Blocks until the event is signalled or the deadline elapses.
    pub fn wait(&self, deadline: Deadline) -> WaitOutcome {
        match Self::wait_any(&[self], deadline) {
            Some(_) => WaitOutcome::Signaled,
            None => WaitOutcome::TimedOut,
        }
    }

    /// Blocks until any of `events` is signalled or the deadline elapses.
    ///
    /// Returns the index of a signalled event, `None` on timeout. When
    /// several events are already set, the lowest index wins.
    pub fn wait_any(events: &[&Self], deadline: Deadline) -> Option<usize> {
        for (index, event) in events.iter().enumerate() {
            if event.is_set() {
                return Some(index);
            }
        }

        let waiter = Waiter::new();
        for (index, event) in events.iter().enumerate() {
            let mut state = event.lock_state();
            if state.set {
                // Set between the fast path and registration; no wake-up
                // will come for this one, so claim it directly.
                drop(state);
                Self::deregister(&events[..index], &waiter);
                return Some(index);
            }
            state.waiters.push((Arc::clone(&waiter), index));
        }

        let won = waiter.wait(deadline);
        Self::deregister(events, &waiter);
        won
    }

    fn deregister(events: &[&Self], waiter: &Arc<Waiter>) {
        for event in events {
            event
                .lock_state()
                .waiters
                .retain(|(registered, _)| !Arc::ptr_eq(registered, waiter));
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, EventState> {
        lock_recover(&self.state)
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event").field("set", &self.is_set()).finish()
    }
}

fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
