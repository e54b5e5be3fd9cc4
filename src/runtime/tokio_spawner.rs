//! Tokio runtime spawner implementation.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::core::{Job, PoolError, SpawnRejected, TaskSpawner};

/// Spawner that runs jobs on a tokio runtime's blocking thread pool.
///
/// Lets a `TickScheduler` share an application's tokio runtime instead of a
/// dedicated `TaskPool`.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: Arc<tokio::runtime::Handle>,
}

impl TokioSpawner {
    /// Create a new `TokioSpawner` from a tokio runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Use the runtime the caller is currently inside.
    ///
    /// # Panics
    ///
    /// Outside a tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl TaskSpawner for TokioSpawner {
    /// A runtime that has shut down cancels the blocking task on the spot;
    /// the job is then taken back and returned unrun.
    fn spawn_job(&self, job: Box<dyn Job>) -> Result<(), SpawnRejected> {
        let slot = Arc::new(Mutex::new(Some(job)));
        let worker_slot = Arc::clone(&slot);
        let join = self.handle.spawn_blocking(move || {
            let job = worker_slot.lock().take();
            if let Some(job) = job {
                job.run();
            }
        });

        if join.is_finished() {
            if let Some(job) = slot.lock().take() {
                warn!("Tokio runtime is shut down; job rejected");
                return Err(SpawnRejected {
                    error: PoolError::NotAccepting,
                    job,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::time::Duration;

    #[test]
    fn test_spawn_job_runs_on_blocking_pool() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let spawner = TokioSpawner::new(runtime.handle().clone());
        let (tx, rx) = bounded(1);
        spawner
            .spawn_job(Box::new(move || tx.send(7_u8).unwrap()))
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }

    #[test]
    fn test_spawn_job_after_runtime_shutdown_hands_job_back() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let spawner = TokioSpawner::new(runtime.handle().clone());
        runtime.shutdown_background();

        let (tx, rx) = bounded(1);
        let rejected = spawner
            .spawn_job(Box::new(move || tx.send(3_u8).unwrap()))
            .unwrap_err();
        assert_eq!(rejected.error, PoolError::NotAccepting);
        assert!(rx.try_recv().is_err());

        rejected.job.run();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 3);
    }
}
