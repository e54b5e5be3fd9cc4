//! Core pool and scheduler abstractions.

pub mod dependency;
pub mod error;
pub mod executor;
pub mod task;
pub mod task_pool;
pub mod tick_scheduler;
pub mod tick_task;
pub mod worker_queue;

pub use error::{AppResult, PoolError, SchedulerError, TaskError};
pub use executor::{panic_message, Job, SpawnRejected, TaskSpawner};
pub use task::{Task, TaskHandle, TaskId};
pub use task_pool::{PoolStats, TaskPool};
pub use tick_scheduler::{SchedulerSnapshot, TickScheduler};
pub use tick_task::{
    Backoff, CompletionCallback, RepeatPolicy, RetryPolicy, TickBody, TickOutcome, TickTask,
    TickTaskBuilder, TickTaskHandle, TickTaskState, DEFAULT_PRIORITY,
};
pub use worker_queue::WorkerQueue;
