//! Queued task units and the handle returned to submitters.

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::Mutex;

use crate::core::{Job, TaskError};

/// Identifier shared by pool tasks and tick tasks.
pub type TaskId = u64;

/// A unit of work sitting in a `WorkerQueue`.
///
/// Owned by exactly one queue slot at a time. Once popped or stolen it is run
/// exactly once by the worker that took it.
///
/// Jobs are only `Send`; the mutex makes a `Task` `Sync` so queues can sit
/// behind a reader-writer lock. It is never contended: the job is only
/// reached by value.
pub struct Task {
    id: TaskId,
    job: Mutex<Box<dyn Job>>,
}

impl Task {
    /// Wrap a job with its id.
    pub fn new(id: TaskId, job: Box<dyn Job>) -> Self {
        Self {
            id,
            job: Mutex::new(job),
        }
    }

    /// Task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Execute the task, consuming it.
    pub fn run(self) {
        self.job.into_inner().run();
    }

    /// Unwrap the job without running it.
    #[must_use]
    pub fn into_job(self) -> Box<dyn Job> {
        self.job.into_inner()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Future-like handle for a task submitted through `TaskPool::enqueue`.
///
/// The worker holds the sending half. If the task is discarded without running
/// (hard stop or resize) the sender is dropped and the handle resolves to
/// `TaskError::Abandoned`.
pub struct TaskHandle<R> {
    id: TaskId,
    rx: Receiver<Result<R, TaskError>>,
}

impl<R> TaskHandle<R> {
    pub(crate) const fn new(id: TaskId, rx: Receiver<Result<R, TaskError>>) -> Self {
        Self { id, rx }
    }

    /// Id of the underlying task.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Block until the task finishes.
    ///
    /// # Errors
    ///
    /// `TaskError::Panicked` if the body panicked, `TaskError::Abandoned` if
    /// the task was dropped before running.
    pub fn wait(self) -> Result<R, TaskError> {
        self.rx.recv().unwrap_or(Err(TaskError::Abandoned))
    }

    /// Block until the task finishes or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// As [`TaskHandle::wait`], plus `TaskError::Timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<R, TaskError> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(TaskError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TaskError::Abandoned),
        }
    }

    /// Non-blocking check. Returns `None` while the task is still pending.
    pub fn try_wait(&self) -> Option<Result<R, TaskError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TaskError::Abandoned)),
        }
    }
}

#[cfg(feature = "tokio-runtime")]
impl<R: Send + 'static> TaskHandle<R> {
    /// Await the result without blocking the async runtime.
    ///
    /// The channel wait is moved onto tokio's blocking thread pool.
    ///
    /// # Errors
    ///
    /// As [`TaskHandle::wait`].
    pub async fn wait_async(self) -> Result<R, TaskError> {
        tokio::task::spawn_blocking(move || self.wait())
            .await
            .unwrap_or(Err(TaskError::Abandoned))
    }
}

impl<R> fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.id).finish_non_exhaustive()
    }
}
