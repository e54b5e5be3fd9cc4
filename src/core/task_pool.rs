//! Work-stealing thread pool.
//!
//! A `TaskPool` owns one `WorkerQueue` per worker thread. Work submitted from
//! outside the pool lands on queue 0; work submitted from inside a worker stays
//! on that worker's own queue. Idle workers steal from the tail of their
//! neighbours' queues and otherwise sleep on a shared condition variable.
//!
//! # Shutdown flavours
//!
//! - [`TaskPool::stop_accepting_tasks`]: refuse new work, keep draining.
//! - [`TaskPool::drain`]: refuse new work, wait for everything queued and
//!   running to finish, then join the workers.
//! - [`TaskPool::resize`] / [`TaskPool::shutdown`] / drop: hard stop. Workers
//!   finish the task in hand and exit; queued tasks are discarded and their
//!   handles resolve to `TaskError::Abandoned`.
//!
//! # Example
//!
//! ```
//! use prometheus_task_pool::core::TaskPool;
//!
//! let pool = TaskPool::new(2)?;
//! let handle = pool.enqueue(|| 6 * 7)?;
//! assert_eq!(handle.wait(), Ok(42));
//! # Ok::<(), prometheus_task_pool::core::PoolError>(())
//! ```

mod pool;
mod worker;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

pub use pool::TaskPool;

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Tasks currently executing.
    pub active_tasks: u64,
    /// Tasks waiting in worker queues.
    pub queued_tasks: usize,
    /// Total tasks accepted.
    pub submitted_tasks: u64,
    /// Tasks that ran to completion.
    pub completed_tasks: u64,
    /// Tasks whose body panicked.
    pub failed_tasks: u64,
    /// Tasks taken from another worker's queue.
    pub stolen_tasks: u64,
    /// Queued tasks dropped by a hard stop or resize.
    pub discarded_tasks: u64,
}

/// Internal counters for pool statistics (survive resizes).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub submitted_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub stolen_tasks: AtomicU64,
    pub discarded_tasks: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize, queued_tasks: usize) -> PoolStats {
        PoolStats {
            worker_count,
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            queued_tasks,
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            stolen_tasks: self.stolen_tasks.load(Ordering::Relaxed),
            discarded_tasks: self.discarded_tasks.load(Ordering::Relaxed),
        }
    }
}
