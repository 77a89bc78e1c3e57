//! In-memory message pump.
//!
//! [`StubPump`] stands in for the platform event-dispatch API: a FIFO of
//! [`Message`]s, a registered extraction hook, and a combined
//! object/message wait built from [`Event::wait_any`]. Tests drive the
//! UI-thread injection protocol against it without a windowing system.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::sync::Event;
use crate::time::Deadline;

use super::pump::{HookVerdict, Message, MessageClass, MessageHook, MessagePump, PumpWait};

/// An in-memory [`MessagePump`].
#[derive(Default)]
pub struct StubPump {
    queue: Mutex<VecDeque<Message>>,
    hook: Mutex<Option<Arc<dyn MessageHook>>>,
    /// Set whenever a message is posted; reset under the queue lock when
    /// a waiter finds no matching message, so a concurrent post cannot be
    /// missed.
    arrival: Event,
}

impl StubPump {
    /// Creates an empty pump.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued messages.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    fn take_matching(&self, classes: &[MessageClass]) -> Option<Message> {
        let mut queue = self.queue.lock();
        let position = queue.iter().position(|m| classes.contains(&m.class()))?;
        queue.remove(position)
    }

    fn current_hook(&self) -> Option<Arc<dyn MessageHook>> {
        self.hook.lock().clone()
    }
}

impl MessagePump for StubPump {
    fn register_hook(&self, hook: Arc<dyn MessageHook>) {
        *self.hook.lock() = Some(hook);
    }

    fn clear_hook(&self) {
        *self.hook.lock() = None;
    }

    fn post(&self, message: Message) {
        let mut queue = self.queue.lock();
        queue.push_back(message);
        self.arrival.set();
    }

    fn peek(&self, classes: &[MessageClass]) -> Option<Message> {
        loop {
            let message = self.take_matching(classes)?;
            // The hook runs outside the queue lock: extracted actions may
            // post further messages.
            let verdict = self
                .current_hook()
                .map_or(HookVerdict::Deliver, |hook| hook.on_extract(&message));
            match verdict {
                HookVerdict::Deliver => return Some(message),
                HookVerdict::Swallow => {}
            }
        }
    }

    fn dispatch(&self, message: Message) {
        message.invoke();
    }

    fn wait(&self, events: &[&Event], classes: &[MessageClass], deadline: Deadline) -> PumpWait {
        loop {
            {
                let queue = self.queue.lock();
                if queue.iter().any(|m| classes.contains(&m.class())) {
                    return PumpWait::Message;
                }
                self.arrival.reset();
            }
            let mut watched: Vec<&Event> = events.to_vec();
            watched.push(&self.arrival);
            match Event::wait_any(&watched, deadline) {
                None => return PumpWait::TimedOut,
                Some(index) if index < events.len() => return PumpWait::Event(index),
                Some(_) => {}
            }
        }
    }
}

impl std::fmt::Debug for StubPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubPump")
            .field("pending", &self.pending())
            .finish()
    }
}
