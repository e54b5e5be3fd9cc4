//! Discrete-time scheduler driving `TickTask`s onto an executor.
//!
//! A single clock thread owns every scheduling decision: it advances the tick
//! counter, picks eligible tasks, and hands their bodies to the executor (or
//! runs them inline when no executor is reachable). Task bodies may run in
//! parallel; tick advancement and dependency evaluation never do.
//!
//! # Clock modes
//!
//! - **Automatic**: the tick advances once per tick length.
//! - **Manual**: the tick advances once per [`TickScheduler::trigger_tasks`].
//!
//! Tasks are only dispatched once a tick has been reached by an advance. While
//! work dispatched at that tick is still in flight, its completions re-run the
//! dispatch pass so dependents and tasks held back by the concurrency cap go
//! out at the same tick. Other wake-ups (a new task, a resume, a mode switch)
//! never dispatch on their own; a task runs at most once per tick.
//!
//! # Dependencies
//!
//! Callers must keep the dependency graph acyclic. A cycle is not an error the
//! scheduler raises: the tasks involved simply never become eligible.
//! [`TickScheduler::validate_dependencies`] is an opt-in check for this.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use prometheus_task_pool::config::TickSchedulerConfig;
//! use prometheus_task_pool::core::{TaskPool, TickScheduler};
//!
//! let pool = Arc::new(TaskPool::new(2)?);
//! let scheduler = TickScheduler::with_spawner(
//!     TickSchedulerConfig::new().with_tick_length_ms(5),
//!     &pool,
//! )?;
//! let task = scheduler.schedule_task(3, || println!("tick 3 reached"));
//! assert!(task.wait_completion(Duration::from_secs(5)).is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::config::TickSchedulerConfig;
use crate::core::dependency;
use crate::core::tick_task::Settlement;
use crate::core::{
    Job, SchedulerError, TaskId, TaskSpawner, TickOutcome, TickTaskBuilder, TickTaskHandle,
};

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    /// Current tick.
    pub current_tick: u64,
    /// Whether the clock is paused.
    pub paused: bool,
    /// Whether the clock only advances on trigger.
    pub manual_mode: bool,
    /// Tick length in milliseconds.
    pub tick_length_ms: u64,
    /// Concurrency cap (0 = unlimited).
    pub max_concurrent_tasks: usize,
    /// Ids of pending tasks, ascending.
    pub pending_task_ids: Vec<TaskId>,
    /// Tasks dispatched and not yet settled.
    pub running_tasks: usize,
}

/// State guarded by the scheduler lock.
struct SchedulerState {
    tasks: Vec<TickTaskHandle>,
    paused: bool,
    manual: bool,
    stop: bool,
    pending_triggers: u64,
    /// Set by a tick advance; cleared once nothing more can go out at it.
    armed: bool,
    tick_length: Duration,
    max_concurrent: usize,
}

struct SchedulerShared {
    state: Mutex<SchedulerState>,
    signal: Condvar,
    current_tick: AtomicU64,
    running: AtomicUsize,
    spawner: RwLock<Option<Weak<dyn TaskSpawner>>>,
    next_id: AtomicU64,
}

impl SchedulerShared {
    fn current_tick(&self) -> u64 {
        self.current_tick.load(Ordering::Acquire)
    }

    /// Mark eligible tasks running and remove them from the pending set.
    fn take_eligible(&self, state: &mut SchedulerState) -> Vec<TickTaskHandle> {
        let tick = self.current_tick();
        let mut eligible: Vec<TickTaskHandle> = state
            .tasks
            .iter()
            .filter(|t| t.is_eligible(tick) && t.last_run_tick() != Some(tick))
            .cloned()
            .collect();
        if eligible.is_empty() {
            return eligible;
        }

        eligible.sort_by_key(|t| (t.priority(), t.target_tick(), t.id()));

        if state.max_concurrent > 0 {
            let slots = state
                .max_concurrent
                .saturating_sub(self.running.load(Ordering::Acquire));
            if slots < eligible.len() {
                trace!(
                    tick,
                    eligible = eligible.len(),
                    slots,
                    "Concurrency cap holding back eligible tasks"
                );
            }
            eligible.truncate(slots);
        }

        eligible.retain(|t| t.try_mark_running(tick));
        self.running.fetch_add(eligible.len(), Ordering::AcqRel);

        let taken: HashSet<TaskId> = eligible.iter().map(|t| t.id()).collect();
        state.tasks.retain(|t| !taken.contains(&t.id()));
        eligible
    }

    /// Send a batch to the executor, or run it here if there is none.
    fn dispatch(self: &Arc<Self>, batch: Vec<TickTaskHandle>) {
        let spawner = self.spawner.read().as_ref().and_then(Weak::upgrade);

        for task in batch {
            debug!(
                task_id = task.id(),
                tick = self.current_tick(),
                priority = task.priority(),
                "Dispatching tick task"
            );
            let job = Box::new(TickJob {
                shared: Arc::clone(self),
                task: Some(task),
            });

            match &spawner {
                Some(spawner) => {
                    if let Err(rejected) = spawner.spawn_job(job) {
                        warn!(error = %rejected.error, "Executor rejected tick task; running inline");
                        rejected.job.run();
                    }
                }
                None => job.run(),
            }
        }
    }

    fn execute(&self, task: &TickTaskHandle) {
        let outcome = task.run_body();
        if let TickOutcome::Failed(reason) = &outcome {
            error!(
                task_id = task.id(),
                attempt = task.failed_attempts() + 1,
                error = %reason,
                "Tick task failed"
            );
        }

        let settlement = task.settle(outcome, self.current_tick());
        self.running.fetch_sub(1, Ordering::AcqRel);

        let mut state = self.state.lock();
        match settlement {
            Settlement::Rearmed => {
                debug!(task_id = task.id(), target_tick = task.target_tick(), "Tick task re-armed");
                state.tasks.push(Arc::clone(task));
            }
            Settlement::Completed => {
                debug!(task_id = task.id(), "Tick task completed");
            }
        }
        self.signal.notify_all();
    }

    /// A dispatched task was dropped by its executor without running.
    fn requeue_unrun(&self, task: TickTaskHandle) {
        warn!(task_id = task.id(), "Tick task dropped by executor before running; re-queueing");
        task.rearm_at(task.target_tick());
        self.running.fetch_sub(1, Ordering::AcqRel);

        let mut state = self.state.lock();
        state.tasks.push(task);
        self.signal.notify_all();
    }
}

/// Job wrapper that returns its task to the pending set if it is dropped
/// unrun (e.g. by a pool hard stop).
struct TickJob {
    shared: Arc<SchedulerShared>,
    task: Option<TickTaskHandle>,
}

impl Job for TickJob {
    fn run(mut self: Box<Self>) {
        if let Some(task) = self.task.take() {
            self.shared.execute(&task);
        }
    }
}

impl Drop for TickJob {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.shared.requeue_unrun(task);
        }
    }
}

fn run_clock(shared: &Arc<SchedulerShared>) {
    debug!("Tick clock started");
    let mut next_tick_at = Instant::now();
    let mut state = shared.state.lock();

    loop {
        if state.stop {
            break;
        }

        if state.paused {
            // Resuming does not dispatch until the next advance.
            state.armed = false;
            shared.signal.wait(&mut state);
            next_tick_at = Instant::now() + state.tick_length;
            continue;
        }

        let advance = if state.manual {
            if state.pending_triggers > 0 {
                state.pending_triggers -= 1;
                true
            } else {
                false
            }
        } else {
            Instant::now() >= next_tick_at
        };

        if advance {
            let tick = shared.current_tick.fetch_add(1, Ordering::AcqRel) + 1;
            next_tick_at = Instant::now() + state.tick_length;
            state.armed = true;
            trace!(tick, "Tick advanced");
        }

        if state.armed {
            // Read before scanning so a completion racing the scan keeps
            // dispatch armed.
            let in_flight = shared.running.load(Ordering::Acquire);
            let batch = shared.take_eligible(&mut state);
            if !batch.is_empty() {
                MutexGuard::unlocked(&mut state, || shared.dispatch(batch));
                // Inline completions may have unblocked dependents.
                continue;
            }
            if in_flight == 0 {
                state.armed = false;
            }
        }

        if state.manual {
            if state.pending_triggers == 0 {
                shared.signal.wait(&mut state);
            }
        } else {
            shared.signal.wait_until(&mut state, next_tick_at);
        }
    }

    info!(tick = shared.current_tick(), "Tick clock stopped");
}

/// Tick-driven scheduler with dependency gating and retry/repeat policies.
pub struct TickScheduler {
    shared: Arc<SchedulerShared>,
    clock: Mutex<Option<JoinHandle<()>>>,
}

impl TickScheduler {
    /// Start a scheduler. Without a spawner every task runs inline on the
    /// clock thread.
    ///
    /// # Errors
    ///
    /// `SchedulerError::InvalidConfig` for an invalid configuration,
    /// `SchedulerError::ClockThread` if the clock thread cannot start.
    pub fn new(
        config: TickSchedulerConfig,
        spawner: Option<Weak<dyn TaskSpawner>>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let shared = Arc::new(SchedulerShared {
            state: Mutex::new(SchedulerState {
                tasks: Vec::new(),
                paused: config.start_paused,
                manual: config.manual_mode,
                stop: false,
                pending_triggers: 0,
                armed: false,
                tick_length: config.tick_length(),
                max_concurrent: config.max_concurrent_tasks,
            }),
            signal: Condvar::new(),
            current_tick: AtomicU64::new(0),
            running: AtomicUsize::new(0),
            spawner: RwLock::new(spawner),
            next_id: AtomicU64::new(0),
        });

        let clock_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("tick-clock".into())
            .spawn(move || run_clock(&clock_shared))
            .map_err(|e| SchedulerError::ClockThread(e.to_string()))?;

        info!(
            tick_length_ms = config.tick_length_ms,
            manual_mode = config.manual_mode,
            max_concurrent_tasks = config.max_concurrent_tasks,
            "TickScheduler started"
        );

        Ok(Self {
            shared,
            clock: Mutex::new(Some(handle)),
        })
    }

    /// Start a scheduler that dispatches onto `spawner` through a weak
    /// reference.
    ///
    /// # Errors
    ///
    /// As [`TickScheduler::new`].
    pub fn with_spawner<S: TaskSpawner>(
        config: TickSchedulerConfig,
        spawner: &Arc<S>,
    ) -> Result<Self, SchedulerError> {
        let weak: Weak<S> = Arc::downgrade(spawner);
        let weak: Weak<dyn TaskSpawner> = weak;
        Self::new(config, Some(weak))
    }

    /// Re-wire the executor.
    pub fn set_spawner<S: TaskSpawner>(&self, spawner: &Arc<S>) {
        let weak: Weak<S> = Arc::downgrade(spawner);
        let weak: Weak<dyn TaskSpawner> = weak;
        *self.shared.spawner.write() = Some(weak);
    }

    /// Drop the executor; tasks run inline from now on.
    pub fn clear_spawner(&self) {
        *self.shared.spawner.write() = None;
    }

    /// Whether a live executor is currently wired in.
    #[must_use]
    pub fn has_live_spawner(&self) -> bool {
        self.shared
            .spawner
            .read()
            .as_ref()
            .is_some_and(|w| w.strong_count() > 0)
    }

    /// Schedule `f` to run at or after `tick`.
    pub fn schedule_task<F>(&self, tick: u64, f: F) -> TickTaskHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.schedule(TickTaskBuilder::new(tick, f))
    }

    /// Schedule a fallible body; `Err` counts as a failed run.
    pub fn schedule_fallible_task<F>(&self, tick: u64, f: F) -> TickTaskHandle
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.schedule(TickTaskBuilder::fallible(tick, f))
    }

    /// Schedule a fully configured task.
    pub fn schedule(&self, builder: TickTaskBuilder) -> TickTaskHandle {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let task = Arc::new(builder.build(id));

        let mut state = self.shared.state.lock();
        if state.stop {
            warn!(task_id = id, "Task scheduled on a stopped scheduler will never run");
        }
        state.tasks.push(Arc::clone(&task));
        self.shared.signal.notify_all();
        drop(state);

        debug!(task_id = id, target_tick = task.target_tick(), "Tick task scheduled");
        task
    }

    /// Make `task` wait for `dependency` to complete.
    ///
    /// The scheduler does not detect cycles; see
    /// [`TickScheduler::validate_dependencies`].
    ///
    /// # Errors
    ///
    /// `SchedulerError::SelfDependency` if both are the same task,
    /// `SchedulerError::AlreadyDispatched` if `task` is no longer pending.
    pub fn add_dependency(
        &self,
        task: &TickTaskHandle,
        dependency: &TickTaskHandle,
    ) -> Result<(), SchedulerError> {
        if task.id() == dependency.id() {
            return Err(SchedulerError::SelfDependency(task.id()));
        }

        let _state = self.shared.state.lock();
        if !task.is_pending() {
            return Err(SchedulerError::AlreadyDispatched(task.id()));
        }
        task.add_dependency(Arc::clone(dependency));
        Ok(())
    }

    /// Attach a callback invoked once when `task` completes. If it already
    /// has, the callback runs immediately.
    pub fn set_completion_callback<F>(&self, task: &TickTaskHandle, callback: F)
    where
        F: FnOnce(&TickOutcome) + Send + 'static,
    {
        task.set_completion_callback(Box::new(callback));
    }

    /// Remove a pending task. Returns `false` if it is unknown or already
    /// dispatched; a dispatched task runs to completion regardless.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        let mut state = self.shared.state.lock();
        let Some(pos) = state.tasks.iter().position(|t| t.id() == id) else {
            return false;
        };
        if !state.tasks[pos].try_cancel() {
            return false;
        }
        state.tasks.swap_remove(pos);
        drop(state);

        info!(task_id = id, "Tick task cancelled");
        true
    }

    /// Push due ticks back by `delay` ticks (default 1), for one task or, with
    /// no id, for every pending task. Returns how many tasks were delayed.
    pub fn delay_task(&self, id: Option<TaskId>, delay: Option<u64>) -> usize {
        let delay = delay.unwrap_or(1);
        let state = self.shared.state.lock();
        let mut delayed = 0;
        for task in state.tasks.iter().filter(|t| id.is_none_or(|id| t.id() == id)) {
            task.delay_by(delay);
            delayed += 1;
        }
        drop(state);

        debug!(?id, delay, delayed, "Delayed tick tasks");
        delayed
    }

    /// Stop advancing the tick and dispatching tasks.
    pub fn pause(&self) {
        self.shared.state.lock().paused = true;
        info!("TickScheduler paused");
    }

    /// Undo [`TickScheduler::pause`].
    pub fn resume(&self) {
        self.shared.state.lock().paused = false;
        self.shared.signal.notify_all();
        info!("TickScheduler resumed");
    }

    /// Whether the clock is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    /// Advance the tick only on [`TickScheduler::trigger_tasks`].
    pub fn switch_to_manual_mode(&self) {
        self.shared.state.lock().manual = true;
        self.shared.signal.notify_all();
        info!("TickScheduler switched to manual mode");
    }

    /// Advance the tick once per tick length.
    pub fn switch_to_auto_mode(&self) {
        let mut state = self.shared.state.lock();
        state.manual = false;
        state.pending_triggers = 0;
        self.shared.signal.notify_all();
        drop(state);
        info!("TickScheduler switched to automatic mode");
    }

    /// Whether the clock is in manual mode.
    #[must_use]
    pub fn is_manual_mode(&self) -> bool {
        self.shared.state.lock().manual
    }

    /// Advance one tick in manual mode. Returns `false` (and does nothing)
    /// in automatic mode.
    pub fn trigger_tasks(&self) -> bool {
        let mut state = self.shared.state.lock();
        if !state.manual {
            return false;
        }
        state.pending_triggers += 1;
        self.shared.signal.notify_all();
        true
    }

    /// Change the automatic-mode tick length.
    ///
    /// # Errors
    ///
    /// `SchedulerError::InvalidConfig` for a zero duration.
    pub fn set_tick_length(&self, tick_length: Duration) -> Result<(), SchedulerError> {
        if tick_length.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "tick length must be greater than 0".into(),
            ));
        }
        self.shared.state.lock().tick_length = tick_length;
        self.shared.signal.notify_all();
        Ok(())
    }

    /// Current automatic-mode tick length.
    #[must_use]
    pub fn tick_length(&self) -> Duration {
        self.shared.state.lock().tick_length
    }

    /// Cap simultaneously running dispatched tasks; 0 removes the cap.
    pub fn set_max_concurrent_tasks(&self, max: usize) {
        self.shared.state.lock().max_concurrent = max;
        self.shared.signal.notify_all();
    }

    /// Current concurrency cap (0 = unlimited).
    #[must_use]
    pub fn max_concurrent_tasks(&self) -> usize {
        self.shared.state.lock().max_concurrent
    }

    /// Current tick.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.shared.current_tick()
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn pending_task_count(&self) -> usize {
        self.shared.state.lock().tasks.len()
    }

    /// Ids of pending tasks, ascending.
    #[must_use]
    pub fn pending_task_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.shared.state.lock().tasks.iter().map(|t| t.id()).collect();
        ids.sort_unstable();
        ids
    }

    /// Look up a pending task by id.
    #[must_use]
    pub fn task_by_id(&self, id: TaskId) -> Option<TickTaskHandle> {
        self.shared
            .state
            .lock()
            .tasks
            .iter()
            .find(|t| t.id() == id)
            .cloned()
    }

    /// Tasks dispatched and not yet settled.
    #[must_use]
    pub fn running_task_count(&self) -> usize {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Consistent view of the scheduler state.
    #[must_use]
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let state = self.shared.state.lock();
        let mut pending_task_ids: Vec<TaskId> = state.tasks.iter().map(|t| t.id()).collect();
        pending_task_ids.sort_unstable();
        SchedulerSnapshot {
            current_tick: self.shared.current_tick(),
            paused: state.paused,
            manual_mode: state.manual,
            tick_length_ms: u64::try_from(state.tick_length.as_millis()).unwrap_or(u64::MAX),
            max_concurrent_tasks: state.max_concurrent,
            pending_task_ids,
            running_tasks: self.shared.running.load(Ordering::Acquire),
        }
    }

    /// Opt-in check of the pending dependency graph for cycles and
    /// cancelled dependencies.
    ///
    /// # Errors
    ///
    /// `SchedulerError::DependencyCycle` listing every task that can never
    /// become eligible, or `SchedulerError::CancelledDependency`.
    pub fn validate_dependencies(&self) -> Result<(), SchedulerError> {
        let tasks = self.shared.state.lock().tasks.clone();
        dependency::validate(&tasks)
    }

    /// Stop the clock thread and wait for it. Pending tasks stay pending;
    /// dispatched tasks keep running on their executor. Idempotent.
    pub fn stop(&self) {
        self.shared.state.lock().stop = true;
        self.shared.signal.notify_all();

        let Some(handle) = self.clock.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Called from an inline task body; the loop exits once it returns.
            debug!("TickScheduler stopped from the clock thread");
            return;
        }
        if handle.join().is_err() {
            error!("Tick clock thread panicked");
        }
    }
}

impl fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickScheduler")
            .field("current_tick", &self.current_tick())
            .field("running_tasks", &self.running_task_count())
            .field("has_live_spawner", &self.has_live_spawner())
            .finish_non_exhaustive()
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_scheduler() -> TickScheduler {
        TickScheduler::new(TickSchedulerConfig::new().with_manual_mode(true), None).unwrap()
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn test_manual_trigger_advances_one_tick() {
        let scheduler = manual_scheduler();
        assert!(scheduler.is_manual_mode());
        assert_eq!(scheduler.current_tick(), 0);
        assert!(scheduler.trigger_tasks());
        assert!(wait_for(|| scheduler.current_tick() == 1));
        assert!(scheduler.trigger_tasks());
        assert!(scheduler.trigger_tasks());
        assert!(wait_for(|| scheduler.current_tick() == 3));
    }

    #[test]
    fn test_trigger_ignored_in_auto_mode() {
        let scheduler = TickScheduler::new(TickSchedulerConfig::new(), None).unwrap();
        assert!(!scheduler.trigger_tasks());
    }

    #[test]
    fn test_inline_execution_without_spawner() {
        let scheduler = manual_scheduler();
        let task = scheduler.schedule_task(1, || {});
        scheduler.trigger_tasks();
        assert_eq!(task.wait_completion(Duration::from_secs(5)), Some(TickOutcome::Succeeded));
        assert_eq!(task.last_run_tick(), Some(1));
        assert_eq!(scheduler.pending_task_count(), 0);
    }

    #[test]
    fn test_auto_mode_wakeup_without_advance_does_not_dispatch() {
        let scheduler =
            TickScheduler::new(TickSchedulerConfig::new().with_tick_length_ms(60_000), None).unwrap();
        assert!(wait_for(|| scheduler.current_tick() == 1));

        let task = scheduler.schedule_task(0, || {});
        thread::sleep(Duration::from_millis(50));
        assert!(task.is_pending());
        assert_eq!(scheduler.current_tick(), 1);
        assert_eq!(scheduler.pending_task_ids(), vec![task.id()]);
    }

    #[test]
    fn test_panicking_callback_keeps_inline_clock_alive() {
        let scheduler = manual_scheduler();
        let first = scheduler.schedule_task(1, || {});
        scheduler.set_completion_callback(&first, |_| panic!("callback boom"));
        let second = scheduler.schedule_task(2, || {});

        scheduler.trigger_tasks();
        assert_eq!(first.wait_completion(Duration::from_secs(5)), Some(TickOutcome::Succeeded));
        scheduler.trigger_tasks();
        assert_eq!(second.wait_completion(Duration::from_secs(5)), Some(TickOutcome::Succeeded));
        assert_eq!(second.last_run_tick(), Some(2));
    }

    #[test]
    fn test_debug_shows_tick() {
        let scheduler = manual_scheduler();
        assert!(format!("{scheduler:?}").contains("current_tick: 0"));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let scheduler = manual_scheduler();
        let task = scheduler.schedule_task(5, || {});
        assert_eq!(
            scheduler.add_dependency(&task, &task),
            Err(SchedulerError::SelfDependency(task.id()))
        );
    }

    #[test]
    fn test_set_tick_length_rejects_zero() {
        let scheduler = manual_scheduler();
        assert!(scheduler.set_tick_length(Duration::ZERO).is_err());
        scheduler.set_tick_length(Duration::from_millis(7)).unwrap();
        assert_eq!(scheduler.tick_length(), Duration::from_millis(7));
    }

    #[test]
    fn test_delay_all_and_one() {
        let scheduler = manual_scheduler();
        let a = scheduler.schedule_task(2, || {});
        let b = scheduler.schedule_task(4, || {});
        assert_eq!(scheduler.delay_task(None, None), 2);
        assert_eq!(a.target_tick(), 3);
        assert_eq!(b.target_tick(), 5);
        assert_eq!(scheduler.delay_task(Some(b.id()), Some(10)), 1);
        assert_eq!(b.target_tick(), 15);
        assert_eq!(scheduler.delay_task(Some(999), Some(1)), 0);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let scheduler = manual_scheduler();
        scheduler.schedule_task(10, || {});
        scheduler.set_max_concurrent_tasks(3);
        scheduler.pause();
        let snapshot = scheduler.snapshot();
        assert!(snapshot.paused);
        assert!(snapshot.manual_mode);
        assert_eq!(snapshot.max_concurrent_tasks, 3);
        assert_eq!(snapshot.pending_task_ids, vec![0]);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let scheduler = manual_scheduler();
        scheduler.stop();
        scheduler.stop();
    }
}
