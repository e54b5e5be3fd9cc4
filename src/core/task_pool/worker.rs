//! Worker threads and the state they share with the pool.
//!
//! Each resize creates a fresh `PoolShared` generation. Workers only ever see
//! their own generation, so a hard stop can abandon a generation wholesale.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::core::executor::panic_message;
use crate::core::{PoolError, Task, WorkerQueue};

use super::PoolCounters;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// (generation, worker index) of the pool worker running on this thread.
    static CURRENT_WORKER: Cell<Option<(u64, usize)>> = const { Cell::new(None) };
}

/// Identity of the calling thread if it is a pool worker.
pub(crate) fn current_worker() -> Option<(u64, usize)> {
    CURRENT_WORKER.with(Cell::get)
}

/// Queues, flags, and signals shared by one generation of workers.
pub(crate) struct PoolShared {
    generation: u64,
    queues: Vec<WorkerQueue>,
    stop: AtomicBool,
    /// Queued plus running tasks, used by `drain`.
    in_flight: AtomicUsize,
    idle: Mutex<()>,
    wake: Condvar,
    drained: Condvar,
    counters: Arc<PoolCounters>,
}

impl PoolShared {
    pub fn new(worker_count: usize, counters: Arc<PoolCounters>) -> Self {
        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            queues: (0..worker_count).map(|_| WorkerQueue::new()).collect(),
            stop: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            idle: Mutex::new(()),
            wake: Condvar::new(),
            drained: Condvar::new(),
            counters,
        }
    }

    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub fn worker_count(&self) -> usize {
        self.queues.len()
    }

    pub fn queued(&self) -> usize {
        self.queues.iter().map(WorkerQueue::len).sum()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Push onto queue `index` and wake one idle worker.
    pub fn push(&self, index: usize, task: Task) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.queues[index].push(task);
        let _guard = self.idle.lock();
        self.wake.notify_one();
    }

    /// Signal every worker (and any drain waiter) to stop.
    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
        let _guard = self.idle.lock();
        self.wake.notify_all();
        self.drained.notify_all();
    }

    /// Block until no task is queued or running, or the generation stops.
    pub fn wait_until_drained(&self) {
        let mut guard = self.idle.lock();
        while self.in_flight.load(Ordering::Acquire) > 0 && !self.is_stopped() {
            self.drained.wait(&mut guard);
        }
    }

    /// Drop everything still queued. Returns how many tasks were discarded.
    pub fn discard_queued(&self) -> usize {
        let discarded: usize = self.queues.iter().map(|q| q.drain().len()).sum();
        self.in_flight.fetch_sub(discarded, Ordering::AcqRel);
        discarded
    }

    fn has_stealable_work(&self) -> bool {
        self.queues.iter().any(|q| !q.is_empty())
    }

    /// Own queue head first, then steal.
    fn find_task(&self, index: usize) -> Option<Task> {
        self.queues[index].try_pop().or_else(|| self.steal(index))
    }

    /// Scan the other queues starting at `index + 1`, taking from the tail.
    fn steal(&self, index: usize) -> Option<Task> {
        let n = self.queues.len();
        for offset in 1..n {
            let victim = (index + offset) % n;
            if let Some(task) = self.queues[victim].try_steal() {
                self.counters.stolen_tasks.fetch_add(1, Ordering::Relaxed);
                debug!(worker_id = index, victim, task_id = task.id(), "Stole task");
                return Some(task);
            }
        }
        None
    }

    fn execute(&self, index: usize, task: Task) {
        let task_id = task.id();
        self.counters.active_tasks.fetch_add(1, Ordering::Relaxed);

        match catch_unwind(AssertUnwindSafe(move || task.run())) {
            Ok(()) => {
                self.counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                self.counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                error!(
                    worker_id = index,
                    task_id,
                    panic = %panic_message(payload.as_ref()),
                    "Task panicked; worker continues"
                );
            }
        }

        self.counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.idle.lock();
            self.drained.notify_all();
        }
    }
}

/// Spawn worker `index` of the given generation.
pub(crate) fn spawn_worker(
    shared: Arc<PoolShared>,
    index: usize,
    name_prefix: &str,
    stack_size: Option<usize>,
) -> Result<JoinHandle<()>, PoolError> {
    let mut builder = thread::Builder::new().name(format!("{name_prefix}-{index}"));
    if let Some(size) = stack_size {
        builder = builder.stack_size(size);
    }
    builder
        .spawn(move || run_worker(&shared, index))
        .map_err(|e| PoolError::Spawn(e.to_string()))
}

fn run_worker(shared: &PoolShared, index: usize) {
    CURRENT_WORKER.with(|w| w.set(Some((shared.generation, index))));
    debug!(worker_id = index, generation = shared.generation, "Worker thread started");

    loop {
        if shared.is_stopped() {
            break;
        }

        if let Some(task) = shared.find_task(index) {
            shared.execute(index, task);
            continue;
        }

        // Re-check stealable work under the lock so a push between the failed
        // scan and the wait cannot be missed.
        {
            let mut guard = shared.idle.lock();
            while !shared.is_stopped() && !shared.has_stealable_work() {
                shared.wake.wait(&mut guard);
            }
        }

        if let Some(task) = shared.steal(index) {
            shared.execute(index, task);
        }
    }

    CURRENT_WORKER.with(|w| w.set(None));
    debug!(worker_id = index, generation = shared.generation, "Worker thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_steal_scans_neighbours_in_order() {
        let shared = PoolShared::new(3, Arc::new(PoolCounters::default()));
        shared.queues[0].push(Task::new(10, Box::new(|| {})));
        shared.queues[2].push(Task::new(20, Box::new(|| {})));

        // Worker 1 looks at queue 2 before wrapping around to queue 0.
        assert_eq!(shared.steal(1).map(|t| t.id()), Some(20));
        assert_eq!(shared.steal(1).map(|t| t.id()), Some(10));
        assert!(shared.steal(1).is_none());
        assert_eq!(shared.counters.stolen_tasks.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_execute_isolates_panics() {
        let shared = PoolShared::new(1, Arc::new(PoolCounters::default()));
        shared.push(0, Task::new(1, Box::new(|| panic!("boom"))));
        let task = shared.find_task(0).unwrap();
        shared.execute(0, task);
        assert_eq!(shared.counters.failed_tasks.load(Ordering::Relaxed), 1);
        assert_eq!(shared.in_flight.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_discard_queued_counts() {
        let ran = Arc::new(AtomicUsize::new(0));
        let shared = PoolShared::new(2, Arc::new(PoolCounters::default()));
        for i in 0..4 {
            let ran = Arc::clone(&ran);
            shared.push(i % 2, Task::new(i as u64, Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })));
        }
        assert_eq!(shared.queued(), 4);
        assert_eq!(shared.discard_queued(), 4);
        assert_eq!(shared.queued(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
