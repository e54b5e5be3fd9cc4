//! `TaskPool` lifecycle: construction, submission, resize, and shutdown.

use std::fmt;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::bounded;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::TaskPoolConfig;
use crate::core::executor::panic_message;
use crate::core::{Job, PoolError, SpawnRejected, Task, TaskError, TaskHandle, TaskId, TaskSpawner};

use super::worker::{current_worker, spawn_worker, PoolShared};
use super::{PoolCounters, PoolStats};

/// Work-stealing pool of OS threads.
///
/// The number of worker queues always equals the number of live worker
/// threads; both are replaced together on [`TaskPool::resize`].
pub struct TaskPool {
    config: RwLock<TaskPoolConfig>,
    /// Current worker generation. Swapped on resize.
    shared: RwLock<Arc<PoolShared>>,
    /// Worker handles; the lock also serializes resize/drain/shutdown.
    workers: Mutex<Vec<JoinHandle<()>>>,
    accepting: AtomicBool,
    shut_down: AtomicBool,
    counters: Arc<PoolCounters>,
    next_task_id: AtomicU64,
}

impl TaskPool {
    /// Create a pool with `worker_count` threads and default naming.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidConfig` if `worker_count` is 0, `PoolError::Spawn`
    /// if a thread could not be started.
    pub fn new(worker_count: usize) -> Result<Self, PoolError> {
        Self::with_config(TaskPoolConfig::new().with_worker_count(worker_count))
    }

    /// Create a pool from a full configuration.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidConfig` if the configuration is invalid,
    /// `PoolError::Spawn` if a thread could not be started.
    pub fn with_config(config: TaskPoolConfig) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let counters = Arc::new(PoolCounters::default());
        let (shared, workers) = Self::start_generation(&config, &counters)?;

        info!(
            worker_count = config.worker_count,
            thread_name_prefix = %config.thread_name_prefix,
            "TaskPool initialized"
        );

        Ok(Self {
            config: RwLock::new(config),
            shared: RwLock::new(shared),
            workers: Mutex::new(workers),
            accepting: AtomicBool::new(true),
            shut_down: AtomicBool::new(false),
            counters,
            next_task_id: AtomicU64::new(0),
        })
    }

    fn start_generation(
        config: &TaskPoolConfig,
        counters: &Arc<PoolCounters>,
    ) -> Result<(Arc<PoolShared>, Vec<JoinHandle<()>>), PoolError> {
        let shared = Arc::new(PoolShared::new(config.worker_count, Arc::clone(counters)));
        let mut workers = Vec::with_capacity(config.worker_count);

        for index in 0..config.worker_count {
            match spawn_worker(
                Arc::clone(&shared),
                index,
                &config.thread_name_prefix,
                config.thread_stack_size,
            ) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    shared.signal_stop();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(e);
                }
            }
        }

        Ok((shared, workers))
    }

    /// Submit a closure and get a handle to its result.
    ///
    /// Called from one of this pool's workers, the task goes to that worker's
    /// own queue; otherwise it goes to queue 0. One idle worker is woken.
    /// A panic in `f` is caught, logged, and reported through the handle.
    ///
    /// # Errors
    ///
    /// `PoolError::NotAccepting` after [`TaskPool::stop_accepting_tasks`],
    /// during a resize, or after shutdown.
    pub fn enqueue<F, R>(&self, f: F) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);

        let job = move || match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => {
                let _ = tx.send(Ok(value));
            }
            Err(payload) => {
                let _ = tx.send(Err(TaskError::Panicked(panic_message(payload.as_ref()))));
                // Let the worker account for and log the failure.
                resume_unwind(payload);
            }
        };

        self.submit(Task::new(id, Box::new(job)))
            .map_err(|_| PoolError::NotAccepting)?;
        Ok(TaskHandle::new(id, rx))
    }

    /// Route a task to a queue. A rejected task is handed back unrun.
    ///
    /// The accept flag is checked under the generation read lock; stop paths
    /// clear it under the write lock, so a push never lands in a generation
    /// that is already being stopped.
    fn submit(&self, task: Task) -> Result<TaskId, Task> {
        let task_id = task.id();
        let shared = self.shared.read();
        if !self.is_accepting() || shared.is_stopped() {
            warn!(task_id, "TaskPool rejected task: not accepting");
            return Err(task);
        }

        let index = match current_worker() {
            Some((generation, index)) if generation == shared.generation() => index,
            _ => 0,
        };
        shared.push(index, task);
        self.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);

        debug!(task_id, queue = index, "Task submitted to pool");
        Ok(task_id)
    }

    /// Hard-stop the current workers and start `worker_count` fresh ones.
    ///
    /// Queued tasks that have not started are discarded; their handles
    /// resolve to `TaskError::Abandoned`. Use [`TaskPool::drain`] when queued
    /// work must complete.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidConfig` for zero workers, `PoolError::WorkerContext`
    /// when called from one of this pool's workers, `PoolError::NotAccepting`
    /// after shutdown, `PoolError::Spawn` if new threads fail to start (the
    /// pool is then shut down).
    pub fn resize(&self, worker_count: usize) -> Result<(), PoolError> {
        let new_config = self.config.read().clone().with_worker_count(worker_count);
        new_config.validate().map_err(PoolError::InvalidConfig)?;
        self.ensure_not_worker()?;

        let mut workers = self.workers.lock();
        if self.shut_down.load(Ordering::Acquire) {
            return Err(PoolError::NotAccepting);
        }

        self.close_submissions();
        let old = Arc::clone(&self.shared.read());
        Self::stop_generation(&old, &mut workers, &self.counters);

        match Self::start_generation(&new_config, &self.counters) {
            Ok((shared, handles)) => {
                *self.shared.write() = shared;
                *workers = handles;
                *self.config.write() = new_config;
                self.accepting.store(true, Ordering::Release);
                info!(worker_count, "TaskPool resized");
                Ok(())
            }
            Err(e) => {
                self.shut_down.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Refuse new submissions while existing workers keep draining queued work.
    pub fn stop_accepting_tasks(&self) {
        self.close_submissions();
        info!("TaskPool stopped accepting tasks");
    }

    /// Re-open submission after [`TaskPool::stop_accepting_tasks`].
    ///
    /// Has no effect once the pool has been shut down or drained.
    pub fn resume_accepting_tasks(&self) {
        let _workers = self.workers.lock();
        if !self.shut_down.load(Ordering::Acquire) {
            self.accepting.store(true, Ordering::Release);
            info!("TaskPool accepting tasks again");
        }
    }

    /// Graceful shutdown: stop accepting, wait for all queued and running
    /// tasks to finish, then join the workers.
    ///
    /// # Errors
    ///
    /// `PoolError::WorkerContext` when called from one of this pool's workers.
    pub fn drain(&self) -> Result<(), PoolError> {
        self.ensure_not_worker()?;
        let mut workers = self.workers.lock();
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.close_submissions();
        let shared = Arc::clone(&self.shared.read());
        info!(queued = shared.queued(), "Draining TaskPool");
        shared.wait_until_drained();
        Self::stop_generation(&shared, &mut workers, &self.counters);

        info!("TaskPool drained and shut down");
        Ok(())
    }

    /// Hard stop: discard queued work and join the workers. Idempotent.
    ///
    /// # Errors
    ///
    /// `PoolError::WorkerContext` when called from one of this pool's workers.
    pub fn shutdown(&self) -> Result<(), PoolError> {
        self.ensure_not_worker()?;
        let mut workers = self.workers.lock();
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.close_submissions();
        let shared = Arc::clone(&self.shared.read());
        Self::stop_generation(&shared, &mut workers, &self.counters);

        info!("TaskPool shut down");
        Ok(())
    }

    /// Waits out in-flight `submit` calls before clearing the accept flag.
    fn close_submissions(&self) {
        let _generation = self.shared.write();
        self.accepting.store(false, Ordering::Release);
    }

    fn stop_generation(
        shared: &PoolShared,
        workers: &mut Vec<JoinHandle<()>>,
        counters: &PoolCounters,
    ) {
        shared.signal_stop();
        for (worker_id, handle) in workers.drain(..).enumerate() {
            if handle.join().is_err() {
                warn!(worker_id, "Worker thread panicked");
            }
        }

        let discarded = shared.discard_queued();
        if discarded > 0 {
            counters
                .discarded_tasks
                .fetch_add(discarded as u64, Ordering::Relaxed);
            warn!(discarded, "Hard stop discarded queued tasks");
        }
    }

    fn ensure_not_worker(&self) -> Result<(), PoolError> {
        if self.is_worker_thread() {
            return Err(PoolError::WorkerContext);
        }
        Ok(())
    }

    /// Whether the calling thread is one of this pool's current workers.
    #[must_use]
    pub fn is_worker_thread(&self) -> bool {
        current_worker().is_some_and(|(generation, _)| generation == self.shared.read().generation())
    }

    /// Index of the calling worker thread, if it belongs to any `TaskPool`.
    #[must_use]
    pub fn current_worker_index() -> Option<usize> {
        current_worker().map(|(_, index)| index)
    }

    /// Configured number of worker threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.config.read().worker_count
    }

    /// Whether `enqueue` currently accepts work.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Whether the pool has been shut down or drained.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Tasks waiting in worker queues.
    #[must_use]
    pub fn queued_tasks(&self) -> usize {
        self.shared.read().queued()
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let shared = self.shared.read();
        self.counters.snapshot(shared.worker_count(), shared.queued())
    }
}

impl TaskSpawner for TaskPool {
    fn spawn_job(&self, job: Box<dyn Job>) -> Result<(), SpawnRejected> {
        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        self.submit(Task::new(id, job))
            .map(|_| ())
            .map_err(|task| SpawnRejected {
                error: PoolError::NotAccepting,
                job: task.into_job(),
            })
    }
}

impl fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPool")
            .field("worker_count", &self.thread_count())
            .field("accepting", &self.is_accepting())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close_submissions();

        let shared = Arc::clone(&self.shared.read());
        if current_worker().is_some_and(|(generation, _)| generation == shared.generation()) {
            // Dropped from inside one of our own workers; joining would self-deadlock.
            shared.signal_stop();
            debug!("TaskPool dropped from a worker thread - workers will be detached");
            return;
        }

        let mut workers = self.workers.lock();
        Self::stop_generation(&shared, &mut workers, &self.counters);
        debug!("TaskPool dropped and workers joined");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(TaskPool::new(0), Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn test_enqueue_returns_value() {
        let pool = TaskPool::new(2).unwrap();
        let handle = pool.enqueue(|| "done".to_string()).unwrap();
        assert_eq!(handle.wait_timeout(Duration::from_secs(5)).unwrap(), "done");
    }

    #[test]
    fn test_nested_enqueue_stays_on_worker_queue() {
        let pool = Arc::new(TaskPool::new(1).unwrap());
        let inner_pool = Arc::clone(&pool);
        let handle = pool
            .enqueue(move || {
                assert!(inner_pool.is_worker_thread());
                inner_pool.enqueue(TaskPool::current_worker_index).unwrap()
            })
            .unwrap();
        let inner = handle.wait_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(inner.wait_timeout(Duration::from_secs(5)).unwrap(), Some(0));
    }

    #[test]
    fn test_resize_from_worker_is_refused() {
        let pool = Arc::new(TaskPool::new(1).unwrap());
        let inner_pool = Arc::clone(&pool);
        let handle = pool.enqueue(move || inner_pool.resize(2)).unwrap();
        assert_eq!(
            handle.wait_timeout(Duration::from_secs(5)).unwrap(),
            Err(PoolError::WorkerContext)
        );
    }

    #[test]
    fn test_spawn_job_runs() {
        let pool = TaskPool::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = crossbeam_channel::bounded(1);
        let c = Arc::clone(&counter);
        pool.spawn_job(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(());
        }))
        .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pool = TaskPool::new(2).unwrap();
        pool.shutdown().unwrap();
        pool.shutdown().unwrap();
        assert!(pool.is_shut_down());
        assert_eq!(pool.enqueue(|| ()).unwrap_err(), PoolError::NotAccepting);
        assert_eq!(pool.resize(3), Err(PoolError::NotAccepting));
    }
}
