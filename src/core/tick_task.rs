//! Tick-scheduled tasks: due tick, priority, dependencies, and retry/repeat
//! policies.
//!
//! A `TickTask` moves `Pending -> Running -> Completed`, or
//! `Pending -> Cancelled` if cancelled before dispatch. Retry and repeat
//! policies send a finished run back to `Pending` with a later due tick.
//!
//! The state word is the only thing read across the scheduler/executor
//! boundary without the scheduler lock, so it is a single atomic.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::core::executor::panic_message;
use crate::core::TaskId;

/// Shared handle to a scheduled tick task.
pub type TickTaskHandle = Arc<TickTask>;

/// Re-runnable body of a tick task.
pub type TickBody = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Callback invoked once when a tick task reaches `Completed`.
pub type CompletionCallback = Box<dyn FnOnce(&TickOutcome) + Send>;

/// Default priority; lower values are dispatched first.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Lifecycle state of a tick task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TickTaskState {
    /// Waiting for its due tick and dependencies.
    Pending = 0,
    /// Dispatched and executing.
    Running = 1,
    /// Finished (successfully or not). Terminal.
    Completed = 2,
    /// Cancelled while pending. Terminal.
    Cancelled = 3,
}

impl TickTaskState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Completed,
            _ => Self::Cancelled,
        }
    }
}

/// Final result of a tick task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    /// The last run returned `Ok`.
    Succeeded,
    /// The last run failed (returned `Err` or panicked) and no retries remain.
    Failed(String),
}

impl TickOutcome {
    /// Whether this is `Succeeded`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Delay applied before a retry, in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay for every retry.
    Fixed(u64),
    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential {
        /// Delay before the first retry.
        base: u64,
        /// Upper bound on any single delay.
        max: u64,
    },
}

impl Backoff {
    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> u64 {
        match *self {
            Self::Fixed(ticks) => ticks,
            Self::Exponential { base, max } => {
                let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// How often and how far apart a failing task is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first failed run.
    pub max_retries: u32,
    /// Delay schedule between attempts.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Retry up to `max_retries` times, `ticks` apart.
    #[must_use]
    pub const fn fixed(max_retries: u32, ticks: u64) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed(ticks),
        }
    }

    /// Retry up to `max_retries` times with exponential backoff.
    #[must_use]
    pub const fn exponential(max_retries: u32, base: u64, max: u64) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Exponential { base, max },
        }
    }
}

/// Re-run a successful task every `interval` ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatPolicy {
    /// Ticks between successful runs.
    pub interval: u64,
    /// Total runs including the first; `None` repeats until cancelled.
    pub times: Option<u32>,
}

/// What the scheduler must do after a run settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settlement {
    /// Back to `Pending`; put it back into the pending collection.
    Rearmed,
    /// Reached `Completed`.
    Completed,
}

struct CompletionSlot {
    outcome: Option<TickOutcome>,
    callback: Option<CompletionCallback>,
}

/// A task gated on a due tick and on other tasks' completion.
pub struct TickTask {
    id: TaskId,
    priority: i32,
    target_tick: AtomicU64,
    body: TickBody,
    dependencies: Mutex<Vec<TickTaskHandle>>,
    state: AtomicU8,
    retry: Option<RetryPolicy>,
    repeat: Option<RepeatPolicy>,
    /// Consecutive failed attempts of the current run.
    failures: AtomicU32,
    /// Successful runs so far.
    runs: AtomicU32,
    /// Tick at which the task was last dispatched (`u64::MAX` = never).
    last_run_tick: AtomicU64,
    completion: Mutex<CompletionSlot>,
    finished: Condvar,
}

impl TickTask {
    /// Task id, stable for its lifetime.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Dispatch priority; lower runs first among eligible tasks.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Tick at or after which the task may run.
    #[must_use]
    pub fn target_tick(&self) -> u64 {
        self.target_tick.load(Ordering::Acquire)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TickTaskState {
        TickTaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the task is waiting to be dispatched.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state() == TickTaskState::Pending
    }

    /// Whether the task is executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == TickTaskState::Running
    }

    /// Whether the task has completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state() == TickTaskState::Completed
    }

    /// Whether the task was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state() == TickTaskState::Cancelled
    }

    /// Failed attempts in the current run (reset after a success).
    #[must_use]
    pub fn failed_attempts(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    /// Number of successful runs.
    #[must_use]
    pub fn successful_runs(&self) -> u32 {
        self.runs.load(Ordering::Acquire)
    }

    /// Tick at which the task was last dispatched, if ever.
    #[must_use]
    pub fn last_run_tick(&self) -> Option<u64> {
        match self.last_run_tick.load(Ordering::Acquire) {
            u64::MAX => None,
            tick => Some(tick),
        }
    }

    /// Retry policy, if any.
    #[must_use]
    pub const fn retry_policy(&self) -> Option<RetryPolicy> {
        self.retry
    }

    /// Repeat policy, if any.
    #[must_use]
    pub const fn repeat_policy(&self) -> Option<RepeatPolicy> {
        self.repeat
    }

    /// Final outcome once completed.
    #[must_use]
    pub fn outcome(&self) -> Option<TickOutcome> {
        self.completion.lock().outcome.clone()
    }

    /// Block until the task completes or `timeout` elapses.
    ///
    /// Returns `None` on timeout. A cancelled task never completes.
    pub fn wait_completion(&self, timeout: Duration) -> Option<TickOutcome> {
        let mut slot = self.completion.lock();
        if slot.outcome.is_none() {
            let _ = self
                .finished
                .wait_while_for(&mut slot, |s| s.outcome.is_none(), timeout);
        }
        slot.outcome.clone()
    }

    /// Snapshot of the dependency list.
    #[must_use]
    pub fn dependencies(&self) -> Vec<TickTaskHandle> {
        self.dependencies.lock().clone()
    }

    /// Ids of the tasks this one depends on.
    #[must_use]
    pub fn dependency_ids(&self) -> Vec<TaskId> {
        self.dependencies.lock().iter().map(|d| d.id()).collect()
    }

    /// Whether every dependency has completed.
    #[must_use]
    pub fn dependencies_completed(&self) -> bool {
        self.dependencies.lock().iter().all(|d| d.is_completed())
    }

    pub(crate) fn add_dependency(&self, dependency: TickTaskHandle) {
        self.dependencies.lock().push(dependency);
    }

    /// Attach the completion callback. If the task already completed, the
    /// callback runs immediately on the calling thread.
    pub(crate) fn set_completion_callback(&self, callback: CompletionCallback) {
        let mut slot = self.completion.lock();
        if let Some(outcome) = slot.outcome.clone() {
            drop(slot);
            self.invoke_callback(callback, &outcome);
        } else {
            slot.callback = Some(callback);
        }
    }

    pub(crate) fn delay_by(&self, ticks: u64) {
        self.target_tick.fetch_add(ticks, Ordering::AcqRel);
    }

    /// Due, pending, and unblocked at `tick`.
    pub(crate) fn is_eligible(&self, tick: u64) -> bool {
        self.is_pending() && self.target_tick() <= tick && self.dependencies_completed()
    }

    fn transition(&self, from: TickTaskState, to: TickTaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn try_mark_running(&self, tick: u64) -> bool {
        if self.transition(TickTaskState::Pending, TickTaskState::Running) {
            self.last_run_tick.store(tick, Ordering::Release);
            true
        } else {
            false
        }
    }

    pub(crate) fn try_cancel(&self) -> bool {
        self.transition(TickTaskState::Pending, TickTaskState::Cancelled)
    }

    /// Return a dispatched-but-never-run task to `Pending` at `tick`.
    pub(crate) fn rearm_at(&self, tick: u64) {
        self.target_tick.store(tick, Ordering::Release);
        self.transition(TickTaskState::Running, TickTaskState::Pending);
    }

    /// Run the body once, converting a panic into a failure.
    pub(crate) fn run_body(&self) -> TickOutcome {
        match catch_unwind(AssertUnwindSafe(|| (self.body)())) {
            Ok(Ok(())) => TickOutcome::Succeeded,
            Ok(Err(e)) => TickOutcome::Failed(format!("{e:#}")),
            Err(payload) => TickOutcome::Failed(format!("panicked: {}", panic_message(payload.as_ref()))),
        }
    }

    /// Apply retry/repeat policy to the outcome of a run that ended at `tick`.
    pub(crate) fn settle(&self, outcome: TickOutcome, tick: u64) -> Settlement {
        match &outcome {
            TickOutcome::Failed(_) => {
                let attempt = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
                if let Some(retry) = self.retry {
                    if attempt <= retry.max_retries {
                        self.rearm_at(tick.saturating_add(retry.backoff.delay(attempt)));
                        return Settlement::Rearmed;
                    }
                }
            }
            TickOutcome::Succeeded => {
                self.failures.store(0, Ordering::Release);
                let runs = self.runs.fetch_add(1, Ordering::AcqRel) + 1;
                if let Some(repeat) = self.repeat {
                    if repeat.times.is_none_or(|times| runs < times) {
                        self.rearm_at(tick.saturating_add(repeat.interval));
                        return Settlement::Rearmed;
                    }
                }
            }
        }

        let callback = {
            let mut slot = self.completion.lock();
            slot.outcome = Some(outcome.clone());
            self.state.store(TickTaskState::Completed as u8, Ordering::Release);
            self.finished.notify_all();
            slot.callback.take()
        };
        if let Some(callback) = callback {
            self.invoke_callback(callback, &outcome);
        }
        Settlement::Completed
    }

    /// Callbacks run on the clock thread or a pool worker; a panic in one is
    /// logged and swallowed.
    fn invoke_callback(&self, callback: CompletionCallback, outcome: &TickOutcome) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(outcome))) {
            error!(
                task_id = self.id,
                panic = %panic_message(payload.as_ref()),
                "Completion callback panicked"
            );
        }
    }
}

impl fmt::Debug for TickTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickTask")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("target_tick", &self.target_tick())
            .field("state", &self.state())
            .field("dependencies", &self.dependency_ids())
            .finish_non_exhaustive()
    }
}

/// Builder for tick tasks with priority, dependencies, and policies.
///
/// # Example
///
/// ```
/// use prometheus_task_pool::core::{RetryPolicy, TickTaskBuilder};
///
/// let builder = TickTaskBuilder::fallible(5, || Ok(()))
///     .with_priority(-1)
///     .with_retry(RetryPolicy::exponential(3, 1, 8));
/// ```
#[must_use]
pub struct TickTaskBuilder {
    target_tick: u64,
    priority: i32,
    body: TickBody,
    dependencies: Vec<TickTaskHandle>,
    callback: Option<CompletionCallback>,
    retry: Option<RetryPolicy>,
    repeat: Option<RepeatPolicy>,
}

impl TickTaskBuilder {
    /// Infallible body due at `target_tick`.
    pub fn new<F>(target_tick: u64, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::fallible(target_tick, move || {
            f();
            Ok(())
        })
    }

    /// Fallible body due at `target_tick`; `Err` counts as a failed run.
    pub fn fallible<F>(target_tick: u64, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            target_tick,
            priority: DEFAULT_PRIORITY,
            body: Arc::new(f),
            dependencies: Vec::new(),
            callback: None,
            retry: None,
            repeat: None,
        }
    }

    /// Set the dispatch priority (lower first).
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Depend on another task.
    pub fn with_dependency(mut self, dependency: &TickTaskHandle) -> Self {
        self.dependencies.push(Arc::clone(dependency));
        self
    }

    /// Retry failed runs.
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Repeat successful runs.
    pub const fn with_repeat(mut self, repeat: RepeatPolicy) -> Self {
        self.repeat = Some(repeat);
        self
    }

    /// Callback invoked once on completion.
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&TickOutcome) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub(crate) fn build(self, id: TaskId) -> TickTask {
        TickTask {
            id,
            priority: self.priority,
            target_tick: AtomicU64::new(self.target_tick),
            body: self.body,
            dependencies: Mutex::new(self.dependencies),
            state: AtomicU8::new(TickTaskState::Pending as u8),
            retry: self.retry,
            repeat: self.repeat,
            failures: AtomicU32::new(0),
            runs: AtomicU32::new(0),
            last_run_tick: AtomicU64::new(u64::MAX),
            completion: Mutex::new(CompletionSlot {
                outcome: None,
                callback: self.callback,
            }),
            finished: Condvar::new(),
        }
    }
}
