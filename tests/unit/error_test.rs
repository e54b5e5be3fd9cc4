//! Tests for error types

use prometheus_task_pool::core::{AppResult, PoolError, SchedulerError, TaskError};

#[test]
fn test_pool_error_display() {
    assert_eq!(PoolError::NotAccepting.to_string(), "pool is not accepting tasks");
    assert_eq!(
        PoolError::InvalidConfig("worker_count must be greater than 0".into()).to_string(),
        "invalid configuration: worker_count must be greater than 0"
    );
    assert!(PoolError::WorkerContext.to_string().contains("worker thread"));
}

#[test]
fn test_task_error_display() {
    assert_eq!(TaskError::Panicked("boom".into()).to_string(), "task panicked: boom");
    assert_eq!(TaskError::Abandoned.to_string(), "task was abandoned before execution");
    assert_eq!(TaskError::Timeout.to_string(), "timed out waiting for task result");
}

#[test]
fn test_scheduler_error_display() {
    assert_eq!(SchedulerError::TaskNotFound(7).to_string(), "task 7 not found");
    assert_eq!(
        SchedulerError::DependencyCycle(vec![1, 2]).to_string(),
        "dependency cycle detected among tasks [1, 2]"
    );
    assert_eq!(
        SchedulerError::CancelledDependency { task: 3, dependency: 1 }.to_string(),
        "task 3 depends on cancelled task 1"
    );
}

#[test]
fn test_errors_convert_into_anyhow() {
    fn fails() -> AppResult<()> {
        let rejected: Result<(), PoolError> = Err(PoolError::NotAccepting);
        rejected?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert_eq!(err.downcast_ref::<PoolError>(), Some(&PoolError::NotAccepting));
}
