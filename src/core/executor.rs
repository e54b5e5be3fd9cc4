//! Job abstraction and the executor seam used by the scheduler.

use std::any::Any;
use std::fmt;

use crate::core::PoolError;

/// A unit of work that runs exactly once.
///
/// Every `FnOnce() + Send + 'static` closure is a `Job`, so callers rarely
/// implement this directly. Custom job types are useful when the work carries
/// state that should be dropped in a particular way if it never runs.
///
/// # Example
///
/// ```
/// use prometheus_task_pool::core::Job;
///
/// let job: Box<dyn Job> = Box::new(|| println!("hello from a job"));
/// job.run();
/// ```
pub trait Job: Send + 'static {
    /// Consume and execute the job.
    fn run(self: Box<Self>);
}

impl<F> Job for F
where
    F: FnOnce() + Send + 'static,
{
    fn run(self: Box<Self>) {
        (*self)();
    }
}

/// A job the executor refused, handed back to the caller.
pub struct SpawnRejected {
    /// Why the executor refused it.
    pub error: PoolError,
    /// The job, unrun.
    pub job: Box<dyn Job>,
}

impl fmt::Debug for SpawnRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnRejected").field("error", &self.error).finish_non_exhaustive()
    }
}

/// Anything that can accept jobs for asynchronous execution.
///
/// `TaskPool` implements this, as does `TokioSpawner` when the
/// `tokio-runtime` feature is enabled. The `TickScheduler` holds a weak
/// reference to a spawner and falls back to inline execution when the
/// spawner has gone away or rejects the job.
pub trait TaskSpawner: Send + Sync + 'static {
    /// Hand a job over for execution.
    ///
    /// # Errors
    ///
    /// Returns the job inside `SpawnRejected` when the executor refuses new
    /// work, so the caller can run it elsewhere.
    fn spawn_job(&self, job: Box<dyn Job>) -> Result<(), SpawnRejected>;
}

/// Extract a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_closure_is_job() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let job: Box<dyn Job> = Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        job.run();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_message_str_and_string() {
        let err = catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "static message");

        let value = 7;
        let err = catch_unwind(AssertUnwindSafe(|| panic!("formatted {value}"))).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "formatted 7");
    }

    #[test]
    fn test_panic_message_other_payload() {
        let err = catch_unwind(|| std::panic::panic_any(42_u32)).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "non-string panic payload");
    }
}
