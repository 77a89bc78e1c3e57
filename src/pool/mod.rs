//! The pool scheduler.
//!
//! A [`ThreadPool`] owns a bounded FIFO of pending tasks and an elastic
//! set of worker threads. Submission applies backpressure when the queue
//! is full, workers retire after an idle timeout, and shutdown discards
//! un-started work while letting in-flight tasks run to completion.
//!
//! # Scheduling model
//!
//! Real OS threads, pre-emptively scheduled. Workers are symmetric and
//! stateless between tasks; there is no work-stealing and no priority
//! ordering. A single-worker pool runs tasks in strict submission order.
//!
//! # Locking
//!
//! One mutex serialises the queue, the worker counters, and the lifecycle
//! flag. It is never held across task execution nor across a thread
//! spawn; every critical section is O(1) except the shutdown drain.

mod global;
mod queue;

pub use global::{default_pool, submit_to_default};

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::task::{Task, TaskHandle};
use crate::time::Deadline;
use queue::TaskQueue;

/// Default worker idle timeout before self-termination.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Default bound for the pending-task queue.
pub const DEFAULT_MAX_QUEUE: usize = u32::MAX as usize;

/// Configuration for a [`ThreadPool`].
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `max_threads` | available CPU parallelism |
/// | `max_queue` | `u32::MAX` |
/// | `idle_timeout` | 15 s |
/// | `stack_size` | platform default |
/// | `thread_name_prefix` | `"uipool-worker"` |
#[derive(Clone)]
pub struct PoolConfig {
    /// Maximum number of worker threads (at least 1).
    pub max_threads: usize,
    /// Maximum queued-task count before `submit` blocks (at least 1).
    pub max_queue: usize,
    /// How long an idle worker lingers before retiring.
    pub idle_timeout: Duration,
    /// Per-worker stack reservation, `None` for the platform default.
    pub stack_size: Option<usize>,
    /// Name prefix for worker threads.
    pub thread_name_prefix: String,
    /// Callback executed when a worker thread starts.
    pub on_thread_start: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Callback executed when a worker thread stops.
    pub on_thread_stop: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl PoolConfig {
    /// Clamps invalid values to safe defaults.
    pub fn normalize(&mut self) {
        if self.max_threads == 0 {
            self.max_threads = 1;
        }
        if self.max_queue == 0 {
            self.max_queue = 1;
        }
        if self.thread_name_prefix.is_empty() {
            self.thread_name_prefix = "uipool-worker".to_string();
        }
    }

    pub(crate) fn default_max_threads() -> usize {
        thread::available_parallelism()
            .map_or(1, std::num::NonZeroUsize::get)
            .max(1)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_threads: Self::default_max_threads(),
            max_queue: DEFAULT_MAX_QUEUE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            stack_size: None,
            thread_name_prefix: "uipool-worker".to_string(),
            on_thread_start: None,
            on_thread_stop: None,
        }
    }
}

impl std::fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConfig")
            .field("max_threads", &self.max_threads)
            .field("max_queue", &self.max_queue)
            .field("idle_timeout", &self.idle_timeout)
            .field("stack_size", &self.stack_size)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .finish()
    }
}

/// State guarded by the pool mutex.
struct Shared {
    queue: TaskQueue,
    /// Live workers.
    total: usize,
    /// Workers currently blocked in dequeue.
    idle: usize,
}

struct Inner {
    shared: Mutex<Shared>,
    /// Signalled when a task is enqueued or shutdown is asserted.
    cv_item: Condvar,
    /// Signalled when a task is dequeued.
    cv_space: Condvar,
    /// Signalled when the pool becomes fully idle and when the last
    /// worker exits.
    cv_idle: Condvar,
    /// One-shot: once set, all future submissions are born `Discarded`.
    destroying: AtomicBool,
    /// Zeroed at shutdown so idle workers exit immediately.
    idle_timeout_ms: AtomicU64,
    max_threads: usize,
    max_queue: usize,
    stack_size: Option<usize>,
    thread_name_prefix: String,
    on_thread_start: Option<Arc<dyn Fn() + Send + Sync>>,
    on_thread_stop: Option<Arc<dyn Fn() + Send + Sync>>,
    next_worker_id: AtomicUsize,
    /// Join handles for every worker ever spawned; joined at shutdown so
    /// `shutdown` returning means no worker thread is alive. Handles of
    /// long-retired workers join instantly.
    worker_handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl Inner {
    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Side-effect decided under the lock, performed outside it.
enum SubmitEffect {
    WakeOne,
    Spawn,
    Nothing,
}

/// An elastic, bounded-queue thread pool.
///
/// Dropping the pool runs the shutdown sequence: un-started tasks are
/// discarded, in-flight tasks run to completion, and `drop` returns only
/// after every worker has exited.
///
/// # Example
///
/// ```
/// use uipool::{Deadline, PoolConfig, ThreadPool};
///
/// let pool = ThreadPool::new(PoolConfig {
///     max_threads: 1,
///     ..PoolConfig::default()
/// });
/// let task = pool.submit(|| Ok(()))?;
/// assert!(task.wait(Deadline::from_millis(5_000)));
/// # Ok::<(), uipool::Error>(())
/// ```
pub struct ThreadPool {
    inner: Arc<Inner>,
}

impl ThreadPool {
    /// Creates a pool. No threads are created until the first submission.
    #[must_use]
    pub fn new(mut config: PoolConfig) -> Self {
        config.normalize();
        let idle_timeout_ms =
            u64::try_from(config.idle_timeout.as_millis()).unwrap_or(u64::MAX);
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    queue: TaskQueue::new(),
                    total: 0,
                    idle: 0,
                }),
                cv_item: Condvar::new(),
                cv_space: Condvar::new(),
                cv_idle: Condvar::new(),
                destroying: AtomicBool::new(false),
                idle_timeout_ms: AtomicU64::new(idle_timeout_ms),
                max_threads: config.max_threads,
                max_queue: config.max_queue,
                stack_size: config.stack_size,
                thread_name_prefix: config.thread_name_prefix,
                on_thread_start: config.on_thread_start,
                on_thread_stop: config.on_thread_stop,
                next_worker_id: AtomicUsize::new(0),
                worker_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Submits an action with a fresh embedded cancellation token.
    ///
    /// Blocks while the queue is full (backpressure). Submitting from
    /// inside a task to its own pool is permitted, but doing so against a
    /// full queue can deadlock the worker against its own backpressure.
    pub fn submit<F>(&self, action: F) -> Result<TaskHandle>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.submit_with_token(action, CancelToken::new())
    }

    /// Submits an action observing a caller-supplied cancellation token.
    ///
    /// The token may be shared by many tasks and by arbitrary application
    /// code; the pool itself never cancels it. Actions must restore any
    /// thread-local state they alter before returning and must not
    /// terminate or park the worker thread.
    pub fn submit_with_token<F>(&self, action: F, cancel: CancelToken) -> Result<TaskHandle>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let task = Task::new(Box::new(action), cancel);
        let handle = TaskHandle::new(Arc::clone(&task));

        if self.inner.destroying.load(Ordering::Acquire) {
            task.discard();
            return Ok(handle);
        }

        let effect = {
            let mut shared = self.inner.lock_shared();
            loop {
                // Re-checked under the lock: a shutdown that started after
                // the fast path above must still see this task discarded.
                if self.inner.destroying.load(Ordering::Acquire) {
                    drop(shared);
                    task.discard();
                    return Ok(handle);
                }
                if shared.queue.len() < self.inner.max_queue {
                    break;
                }
                shared = self
                    .inner
                    .cv_space
                    .wait(shared)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            shared.queue.push(task);
            if shared.idle > 0 {
                SubmitEffect::WakeOne
            } else if shared.total < self.inner.max_threads {
                shared.total += 1;
                SubmitEffect::Spawn
            } else {
                SubmitEffect::Nothing
            }
        };

        match effect {
            SubmitEffect::WakeOne => self.inner.cv_item.notify_one(),
            SubmitEffect::Spawn => {
                if let Err(source) = spawn_worker(&self.inner) {
                    self.inner.lock_shared().total -= 1;
                    // The task stays queued; an existing worker may still
                    // pick it up.
                    return Err(Error::ThreadSpawn { source });
                }
            }
            SubmitEffect::Nothing => {}
        }
        Ok(handle)
    }

    /// Blocks until the queue is empty and every worker is idle.
    ///
    /// Does not change pool state. The caller is responsible for
    /// liveness: waiting while other threads keep submitting may never
    /// return.
    pub fn wait_idle(&self) {
        let mut shared = self.inner.lock_shared();
        while !(shared.queue.is_empty() && shared.idle == shared.total) {
            shared = self
                .inner
                .cv_idle
                .wait(shared)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Runs the shutdown sequence. Idempotent; also run by `drop`.
    ///
    /// Order matters: the lifecycle flag is published first so a late
    /// `submit` observes it and returns a `Discarded` task rather than
    /// enqueueing into a dying pool; then idle workers are told to exit
    /// immediately; then un-started work is discarded and the call waits
    /// for every worker to finish its in-flight task and exit.
    pub fn shutdown(&self) {
        self.inner.destroying.store(true, Ordering::Release);
        self.inner.idle_timeout_ms.store(0, Ordering::Release);
        self.inner.cv_item.notify_all();
        self.inner.cv_space.notify_all();

        let drained = self.inner.lock_shared().queue.take_all();
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "discarding queued tasks at shutdown");
        }
        for task in drained {
            task.discard();
        }

        let mut shared = self.inner.lock_shared();
        while shared.total != 0 {
            shared = self
                .inner
                .cv_idle
                .wait(shared)
                .unwrap_or_else(PoisonError::into_inner);
        }
        debug_assert!(shared.queue.is_empty());
        drop(shared);

        // All workers have left the loop; joining also waits out their
        // stop callbacks and thread teardown.
        let handles = {
            let mut worker_handles = self
                .inner
                .worker_handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *worker_handles)
        };
        for handle in handles {
            let _ = handle.join();
        }
        tracing::debug!("thread pool shut down");
    }

    /// Returns true once shutdown has begun.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.destroying.load(Ordering::Acquire)
    }

    /// Number of tasks waiting in the queue.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.inner.lock_shared().queue.len()
    }

    /// Number of live worker threads.
    #[must_use]
    pub fn total_workers(&self) -> usize {
        self.inner.lock_shared().total
    }

    /// Number of workers currently blocked in dequeue.
    #[must_use]
    pub fn idle_workers(&self) -> usize {
        self.inner.lock_shared().idle
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.inner.lock_shared();
        f.debug_struct("ThreadPool")
            .field("queued", &shared.queue.len())
            .field("total_workers", &shared.total)
            .field("idle_workers", &shared.idle)
            .field("shutdown", &self.inner.destroying.load(Ordering::Acquire))
            .finish()
    }
}

fn spawn_worker(inner: &Arc<Inner>) -> std::io::Result<()> {
    let id = inner.next_worker_id.fetch_add(1, Ordering::Relaxed);
    let name = format!("{}-{id}", inner.thread_name_prefix);
    let mut builder = thread::Builder::new().name(name.clone());
    if let Some(stack_size) = inner.stack_size {
        builder = builder.stack_size(stack_size);
    }
    let worker_inner = Arc::clone(inner);
    let handle = builder.spawn(move || worker_main(&worker_inner))?;
    inner
        .worker_handles
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(handle);
    tracing::trace!(worker = %name, "spawned pool worker");
    Ok(())
}

/// The worker loop.
///
/// The idle deadline is computed once per idle phase; retried waits after
/// spurious wake-ups respect the original expiry, not a reset clock.
fn worker_main(inner: &Inner) {
    if let Some(callback) = &inner.on_thread_start {
        callback();
    }
    loop {
        let task = {
            let mut shared = inner.lock_shared();
            shared.idle += 1;
            let idle_deadline =
                Deadline::from_millis(inner.idle_timeout_ms.load(Ordering::Acquire));
            while shared.queue.is_empty() {
                if shared.idle == shared.total {
                    inner.cv_idle.notify_all();
                }
                let timed_out = if inner.idle_timeout_ms.load(Ordering::Acquire) == 0 {
                    true
                } else {
                    match idle_deadline.remaining() {
                        None => {
                            shared = inner
                                .cv_item
                                .wait(shared)
                                .unwrap_or_else(PoisonError::into_inner);
                            false
                        }
                        Some(rem) if rem.is_zero() => true,
                        Some(rem) => {
                            let (guard, timeout) = inner
                                .cv_item
                                .wait_timeout(shared, rem)
                                .unwrap_or_else(PoisonError::into_inner);
                            shared = guard;
                            timeout.timed_out()
                        }
                    }
                };
                if timed_out {
                    if !shared.queue.is_empty() {
                        break;
                    }
                    shared.total -= 1;
                    shared.idle -= 1;
                    if shared.total == 0 {
                        inner.cv_idle.notify_all();
                    }
                    drop(shared);
                    tracing::trace!("pool worker retiring");
                    if let Some(callback) = &inner.on_thread_stop {
                        callback();
                    }
                    return;
                }
            }
            shared.idle -= 1;
            shared.queue.pop()
        };
        inner.cv_space.notify_one();
        if let Some(task) = task {
            task.execute();
        }
    }
}
