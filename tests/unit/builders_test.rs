//! Tests for runtime builders

use std::time::Duration;

use prometheus_task_pool::builders::build_runtime;
use prometheus_task_pool::config::RuntimeConfig;
use prometheus_task_pool::core::TickOutcome;
use prometheus_task_pool::util::init_tracing;

#[test]
fn test_build_runtime_wires_scheduler_to_pool() {
    init_tracing();
    // A second call is a no-op.
    init_tracing();

    let mut cfg = RuntimeConfig::default();
    cfg.pool.worker_count = 2;
    cfg.pool.thread_name_prefix = "built".into();
    cfg.scheduler.manual_mode = true;

    let (pool, scheduler) = build_runtime(&cfg).unwrap();
    assert_eq!(pool.thread_count(), 2);
    assert!(scheduler.has_live_spawner());
    assert!(scheduler.is_manual_mode());

    let (tx, rx) = flume::bounded(1);
    let task = scheduler.schedule_task(1, move || {
        tx.send(std::thread::current().name().map(str::to_owned)).unwrap();
    });
    scheduler.trigger_tasks();

    assert_eq!(task.wait_completion(Duration::from_secs(10)), Some(TickOutcome::Succeeded));
    let thread_name = rx.recv().unwrap().unwrap();
    assert!(thread_name.starts_with("built-"), "ran on {thread_name}");
}

#[test]
fn test_build_runtime_rejects_invalid_config() {
    let mut cfg = RuntimeConfig::default();
    cfg.pool.worker_count = 0;
    let err = build_runtime(&cfg).unwrap_err();
    assert!(err.to_string().contains("config invalid"));
}
