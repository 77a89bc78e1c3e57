//! The UI-thread dispatcher.
//!
//! [`UiDispatcher`] is bound to the single thread that owns the
//! event-dispatch loop. Background threads hand it closures through
//! [`perform`](UiDispatcher::perform); the closures run on the next
//! message-pump turn, driven by the extraction hook. The UI thread
//! itself waits through [`modal_wait`](UiDispatcher::modal_wait), which
//! keeps paint, timer, and thread-posted messages flowing so the
//! application never appears frozen.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::sync::Event;
use crate::task::panic_message;
use crate::time::Deadline;

use super::pump::{HookVerdict, Message, MessageClass, MessageHook, MessagePump, PumpWait};

/// Message classes kept flowing during a modal wait. The quit sentinel
/// is extracted too, but deferred to the outer loop rather than
/// dispatched mid-wait.
const MODAL_CLASSES: [MessageClass; 4] = [
    MessageClass::Paint,
    MessageClass::Timer,
    MessageClass::Posted,
    MessageClass::Quit,
];

/// The process-global dispatcher slot.
static ACTIVE: RwLock<Option<Arc<DispatcherInner>>> = RwLock::new(None);

/// One queued cross-thread invocation.
struct UiCall {
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    done: Event,
}

impl UiCall {
    fn new(action: Box<dyn FnOnce() + Send>) -> Arc<Self> {
        Arc::new(Self {
            action: Mutex::new(Some(action)),
            done: Event::new(),
        })
    }
}

type PanicHandler = Arc<dyn Fn(&str) + Send + Sync>;

struct DispatcherInner {
    ui_thread: ThreadId,
    pump: Arc<dyn MessagePump>,
    calls: Mutex<VecDeque<Arc<UiCall>>>,
    /// Nested `modal_wait`s in progress on the UI thread.
    waiting_depth: AtomicUsize,
    panic_handler: Mutex<Option<PanicHandler>>,
}

impl DispatcherInner {
    /// Runs one queued UI call, if any survived retraction.
    fn run_pending(&self) {
        let Some(call) = self.calls.lock().pop_front() else {
            return;
        };
        let action = call.action.lock().take();
        if let Some(action) = action {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(action)) {
                let message = panic_message(payload.as_ref());
                let handler = self.panic_handler.lock().clone();
                match handler {
                    Some(handler) => handler(&message),
                    None => tracing::error!(panic = %message, "ui action panicked"),
                }
            }
        }
        // Set regardless of the action's fate: the caller's contract is
        // "ran", not "ran without failing".
        call.done.set();
    }
}

impl MessageHook for DispatcherInner {
    fn on_extract(&self, message: &Message) -> HookVerdict {
        if message.is_wakeup() {
            self.run_pending();
            return HookVerdict::Deliver;
        }
        if message.class() == MessageClass::CloseRequest
            && self.waiting_depth.load(Ordering::Acquire) > 0
        {
            tracing::trace!("suppressing close request during modal wait");
            return HookVerdict::Swallow;
        }
        HookVerdict::Deliver
    }
}

/// Decrements `waiting_depth` on every exit path, including unwinding
/// out of a dispatched message handler.
struct DepthGuard<'a> {
    depth: &'a AtomicUsize,
}

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::AcqRel);
        Self { depth }
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Clonable handle to the process-global UI dispatcher.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use uipool::{CancelToken, StubPump, UiDispatcher};
///
/// let pump = Arc::new(StubPump::new());
/// let dispatcher = UiDispatcher::install(pump)?;
///
/// // On the UI thread, perform runs inline.
/// let token = CancelToken::new();
/// assert!(dispatcher.perform(|| {}, &token));
///
/// dispatcher.uninstall();
/// # Ok::<(), uipool::Error>(())
/// ```
#[derive(Clone)]
pub struct UiDispatcher {
    inner: Arc<DispatcherInner>,
}

impl UiDispatcher {
    /// Installs the dispatcher on the calling thread, which becomes the
    /// UI thread. Must be called before any use, from the thread that
    /// pumps messages.
    ///
    /// Fails with [`Error::DispatcherInstalled`] if a dispatcher is
    /// already active in the process.
    pub fn install(pump: Arc<dyn MessagePump>) -> Result<Self> {
        let mut active = ACTIVE.write();
        if active.is_some() {
            return Err(Error::DispatcherInstalled);
        }
        let inner = Arc::new(DispatcherInner {
            ui_thread: thread::current().id(),
            pump: Arc::clone(&pump),
            calls: Mutex::new(VecDeque::new()),
            waiting_depth: AtomicUsize::new(0),
            panic_handler: Mutex::new(None),
        });
        pump.register_hook(Arc::clone(&inner) as Arc<dyn MessageHook>);
        *active = Some(Arc::clone(&inner));
        tracing::debug!("ui dispatcher installed");
        Ok(Self { inner })
    }

    /// The currently installed dispatcher, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        ACTIVE.read().as_ref().map(|inner| Self {
            inner: Arc::clone(inner),
        })
    }

    /// Tears the dispatcher down, in reverse order of installation:
    /// the global slot first, then the pump hook. Call from the UI
    /// thread, after all `perform` callers have returned.
    pub fn uninstall(&self) {
        {
            let mut active = ACTIVE.write();
            if active
                .as_ref()
                .is_some_and(|inner| Arc::ptr_eq(inner, &self.inner))
            {
                *active = None;
            }
        }
        self.inner.pump.clear_hook();
        debug_assert!(self.inner.calls.lock().is_empty());
        tracing::debug!("ui dispatcher uninstalled");
    }

    /// Returns true when called on the thread the dispatcher was
    /// installed from.
    #[must_use]
    pub fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.inner.ui_thread
    }

    /// Sets the ambient handler for panics raised by performed actions.
    /// Without one, panics are reported via `tracing::error!` and
    /// swallowed.
    pub fn set_panic_handler(&self, handler: PanicHandler) {
        *self.inner.panic_handler.lock() = Some(handler);
    }

    /// Runs `action` on the UI thread and waits for it.
    ///
    /// Called on the UI thread itself, the action runs inline and
    /// `perform` returns `true` with no queueing. From any other thread,
    /// the action is queued, the UI thread is woken, and the caller
    /// blocks until the action ran (`true`) or `cancel` fired first and
    /// the action was retracted before it started (`false`).
    ///
    /// Guarantee: when `perform` returns, the action is not — and will
    /// never again be — executing.
    pub fn perform<F>(&self, action: F, cancel: &CancelToken) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_ui_thread() {
            action();
            return true;
        }

        let call = UiCall::new(Box::new(action));
        self.inner.calls.lock().push_back(Arc::clone(&call));
        self.inner.pump.post_wakeup();

        match Event::wait_any(&[&call.done, cancel.wait_handle()], Deadline::INFINITE) {
            Some(0) => true,
            _ => {
                let retracted = {
                    let mut calls = self.inner.calls.lock();
                    calls
                        .iter()
                        .position(|queued| Arc::ptr_eq(queued, &call))
                        .and_then(|index| calls.remove(index))
                };
                if retracted.is_some() {
                    tracing::trace!("ui call retracted after cancellation");
                    false
                } else {
                    // The UI thread already took the call; it has begun
                    // (or finished) executing.
                    let _ = call.done.wait(Deadline::INFINITE);
                    true
                }
            }
        }
    }

    /// Waits on `events` from the UI thread while keeping paint, timer,
    /// and thread-posted messages flowing.
    ///
    /// Returns the index of a signalled event, `None` on timeout. A quit
    /// sentinel extracted during the wait is deferred and re-posted on
    /// exit so the outer message loop sees it. Must be called on the UI
    /// thread; failures raised by dispatched messages propagate to the
    /// caller.
    pub fn modal_wait(&self, events: &[&Event], deadline: Deadline) -> Option<usize> {
        debug_assert!(self.is_ui_thread(), "modal_wait is UI-thread only");
        let _depth = DepthGuard::enter(&self.inner.waiting_depth);
        let mut repost_quit = false;

        let result = loop {
            // A pathological timer that regenerates messages faster than
            // its handler runs could otherwise keep the native wait from
            // ever reporting a timeout.
            if deadline.is_elapsed() {
                break None;
            }
            while let Some(message) = self.inner.pump.peek(&MODAL_CLASSES) {
                if message.class() == MessageClass::Quit {
                    repost_quit = true;
                } else {
                    self.inner.pump.dispatch(message);
                }
            }
            match self.inner.pump.wait(events, &MODAL_CLASSES, deadline) {
                PumpWait::Message => {}
                PumpWait::Event(index) => break Some(index),
                PumpWait::TimedOut => break None,
            }
        };

        if repost_quit {
            self.inner.pump.post_quit();
        }
        result
    }
}

impl std::fmt::Debug for UiDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiDispatcher")
            .field("ui_thread", &self.inner.ui_thread)
            .field("queued_calls", &self.inner.calls.lock().len())
            .field(
                "waiting_depth",
                &self.inner.waiting_depth.load(Ordering::Acquire),
            )
            .finish()
    }
}
