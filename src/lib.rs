//! Uipool: an elastic thread pool with first-class tasks, cancellation, and
//! UI-thread work injection.
//!
//! # Overview
//!
//! Uipool targets long-running desktop applications that mix CPU-bound work,
//! I/O-bound work, and interactive UI updates. It is built from three tightly
//! coupled subsystems:
//!
//! - **The pool scheduler** ([`ThreadPool`]): a bounded FIFO task queue
//!   drained by an elastic set of worker threads, with backpressure on
//!   submission, idle-thread reaping, and deadlock-free shutdown.
//! - **The task/cancel model** ([`TaskHandle`], [`CancelToken`]): every
//!   submission gets a monotone terminal-state machine, failure capture at
//!   the worker boundary, and a shareable one-shot cancellation token with
//!   both polling and waiting interfaces.
//! - **The UI-thread injection protocol** ([`UiDispatcher`]): background
//!   threads marshal closures onto the thread that owns the event-dispatch
//!   loop, with cooperative cancellation and a *modal wait* that keeps
//!   paint/timer/thread-posted messages flowing while the UI thread waits.
//!
//! # Core Guarantees
//!
//! - **FIFO within one pool**: a single-worker pool runs tasks in strict
//!   submission order
//! - **Monotone task states**: a task leaves `Pending` exactly once and
//!   never returns; terminal states are published with release/acquire
//!   ordering before the completion signal fires
//! - **No forced termination**: cancellation is cooperative everywhere; a
//!   running task is never stopped pre-emptively
//! - **Retraction on cancel**: a cancelled [`UiDispatcher::perform`] either
//!   ran its action to completion or retracted it before it ever started,
//!   never anything in between
//!
//! # Module Structure
//!
//! - [`time`]: absolute monotonic deadlines
//! - [`sync`]: the manual-reset [`Event`] wait primitive
//! - [`cancel`]: the [`CancelToken`] one-shot flag
//! - [`task`]: task lifecycle, state machine, and observer handles
//! - [`pool`]: the pool scheduler and the process-global default pool
//! - [`ui`]: the message-pump abstraction and the UI dispatcher
//! - [`error`]: error types
//!
//! # Example
//!
//! ```
//! use uipool::{Deadline, PoolConfig, ThreadPool};
//!
//! let pool = ThreadPool::new(PoolConfig {
//!     max_threads: 2,
//!     ..PoolConfig::default()
//! });
//!
//! let task = pool.submit(|| {
//!     // CPU-bound or blocking work runs on a pool worker.
//!     Ok(())
//! })?;
//!
//! assert!(task.wait(Deadline::from_millis(5_000)));
//! pool.wait_idle();
//! # Ok::<(), uipool::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod cancel;
pub mod error;
pub mod pool;
pub mod sync;
pub mod task;
pub mod time;
pub mod ui;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use pool::{default_pool, submit_to_default, PoolConfig, ThreadPool};
pub use sync::{Event, WaitOutcome};
pub use task::{TaskHandle, TaskState};
pub use time::Deadline;
pub use ui::{
    HookVerdict, Message, MessageClass, MessageHook, MessagePump, PumpWait, StubPump, UiDispatcher,
};
