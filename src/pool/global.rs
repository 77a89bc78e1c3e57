//! The process-global default pool.
//!
//! A lazily constructed pool with permissive limits, intended for ad-hoc
//! work that does not justify owning a pool. Initialisation is
//! store-once: racing first users agree on a single instance. The pool
//! lives for the remainder of the process.

use std::sync::OnceLock;
use std::time::Duration;

use crate::error::Result;
use crate::pool::{PoolConfig, ThreadPool};
use crate::task::TaskHandle;

const DEFAULT_POOL_MAX_THREADS: usize = 2_000;
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_millis(15_000);

static DEFAULT_POOL: OnceLock<ThreadPool> = OnceLock::new();

/// Returns the process-global default pool, constructing it on first use.
pub fn default_pool() -> &'static ThreadPool {
    DEFAULT_POOL.get_or_init(|| {
        ThreadPool::new(PoolConfig {
            max_threads: DEFAULT_POOL_MAX_THREADS,
            max_queue: super::DEFAULT_MAX_QUEUE,
            idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            thread_name_prefix: "uipool-default".to_string(),
            ..PoolConfig::default()
        })
    })
}

/// Submits an action to the default pool.
pub fn submit_to_default<F>(action: F) -> Result<TaskHandle>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    default_pool().submit(action)
}
