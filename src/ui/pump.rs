//! The message-pump abstraction.
//!
//! The dispatcher's platform coupling is kept behind a small interface:
//! post a wake-up notification, peek/dispatch one message of a given
//! class, register a per-thread message-extraction callback, and block in
//! a combined object/message wait. A real backend wraps the host
//! event-dispatch API; [`StubPump`](crate::ui::StubPump) is an in-memory
//! implementation that makes the whole injection protocol testable.

use std::sync::Arc;

use crate::sync::Event;
use crate::time::Deadline;

/// Classes of messages a pump can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    /// Repaint request for a window.
    Paint,
    /// Timer expiry.
    Timer,
    /// Posted to the thread itself rather than to a specific window.
    Posted,
    /// Keyboard/mouse and every other window-targeted message.
    Input,
    /// System-wide close-window command directed at an application window.
    CloseRequest,
    /// The quit sentinel that ends the outer message loop.
    Quit,
}

/// One queued message.
///
/// A message optionally carries a handler the pump runs on dispatch; the
/// in-memory pump uses this to model window procedures.
pub struct Message {
    class: MessageClass,
    wakeup: bool,
    handler: Option<Box<dyn FnOnce() + Send>>,
}

impl Message {
    /// Creates a message of the given class with no handler.
    #[must_use]
    pub fn new(class: MessageClass) -> Self {
        Self {
            class,
            wakeup: false,
            handler: None,
        }
    }

    /// Creates a message whose handler runs when the message is
    /// dispatched.
    #[must_use]
    pub fn with_handler(class: MessageClass, handler: impl FnOnce() + Send + 'static) -> Self {
        Self {
            class,
            wakeup: false,
            handler: Some(Box::new(handler)),
        }
    }

    /// The private no-op notification that triggers the extraction hook:
    /// a thread-posted message with the wake-up flag, distinguishable
    /// from every application message.
    #[must_use]
    pub fn wakeup() -> Self {
        Self {
            class: MessageClass::Posted,
            wakeup: true,
            handler: None,
        }
    }

    /// The message class.
    #[must_use]
    pub fn class(&self) -> MessageClass {
        self.class
    }

    /// Returns true for the private wake-up notification.
    #[must_use]
    pub fn is_wakeup(&self) -> bool {
        self.wakeup
    }

    /// Runs the message handler, if any. Called by pump `dispatch`
    /// implementations.
    pub fn invoke(self) {
        if let Some(handler) = self.handler {
            handler();
        }
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("class", &self.class)
            .field("wakeup", &self.wakeup)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// Verdict returned by the extraction hook for each extracted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookVerdict {
    /// Hand the message to the caller for dispatch.
    Deliver,
    /// Drop the message before user code can see it.
    Swallow,
}

/// Result of the combined object/message wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpWait {
    /// The event at this index became signalled.
    Event(usize),
    /// A message of one of the watched classes arrived.
    Message,
    /// The deadline elapsed.
    TimedOut,
}

/// Per-thread message-extraction callback.
///
/// Runs on the UI thread, inside `peek`, for every message about to be
/// extracted.
pub trait MessageHook: Send + Sync {
    /// Inspects one extracted message and decides its fate.
    fn on_extract(&self, message: &Message) -> HookVerdict;
}

/// The host event-dispatch surface the dispatcher is layered on.
pub trait MessagePump: Send + Sync {
    /// Registers the extraction hook. One hook at a time; a later call
    /// replaces the previous one.
    fn register_hook(&self, hook: Arc<dyn MessageHook>);

    /// Removes the extraction hook.
    fn clear_hook(&self);

    /// Posts a message to the UI thread's queue.
    fn post(&self, message: Message);

    /// Posts the private wake-up notification.
    fn post_wakeup(&self) {
        self.post(Message::wakeup());
    }

    /// (Re-)posts the quit sentinel.
    fn post_quit(&self) {
        self.post(Message::new(MessageClass::Quit));
    }

    /// Extracts the next queued message matching one of `classes`,
    /// running the hook on each candidate; hook-swallowed messages are
    /// dropped and never returned. Non-matching messages stay queued.
    fn peek(&self, classes: &[MessageClass]) -> Option<Message>;

    /// Dispatches one extracted message (runs its handler).
    fn dispatch(&self, message: Message);

    /// Blocks until one of `events` is signalled, a message of one of
    /// `classes` arrives, or the deadline elapses.
    fn wait(&self, events: &[&Event], classes: &[MessageClass], deadline: Deadline) -> PumpWait;
}
