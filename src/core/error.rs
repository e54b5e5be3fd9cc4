//! Error types for pool and scheduler operations.

use thiserror::Error;

use crate::core::TaskId;

/// Errors produced by a `TaskPool`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Configuration validation failed (e.g. zero worker threads).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The pool is not accepting new tasks (stopped, resizing, or shut down).
    #[error("pool is not accepting tasks")]
    NotAccepting,
    /// The operation would make a worker thread join itself.
    #[error("operation not permitted from a pool worker thread")]
    WorkerContext,
    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}

/// Failure observed through a `TaskHandle`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The task body panicked; the payload message is preserved.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The task was discarded before it ran (hard stop or resize).
    #[error("task was abandoned before execution")]
    Abandoned,
    /// Waiting for the result timed out.
    #[error("timed out waiting for task result")]
    Timeout,
}

/// Errors produced by the `TickScheduler`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// No pending task carries this id.
    #[error("task {0} not found")]
    TaskNotFound(TaskId),
    /// The task has already left the pending state.
    #[error("task {0} has already been dispatched")]
    AlreadyDispatched(TaskId),
    /// A task cannot depend on itself.
    #[error("task {0} cannot depend on itself")]
    SelfDependency(TaskId),
    /// The pending dependency graph contains a cycle through these tasks.
    #[error("dependency cycle detected among tasks {0:?}")]
    DependencyCycle(Vec<TaskId>),
    /// A pending task depends on a cancelled task and can never run.
    #[error("task {task} depends on cancelled task {dependency}")]
    CancelledDependency {
        /// The blocked task.
        task: TaskId,
        /// The cancelled dependency.
        dependency: TaskId,
    },
    /// Configuration validation failed (e.g. zero tick length).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The clock thread could not be started.
    #[error("clock thread error: {0}")]
    ClockThread(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
