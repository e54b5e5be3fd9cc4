//! Tests for configuration validation and loading

use std::collections::HashMap;
use std::time::Duration;

use prometheus_task_pool::config::{RuntimeConfig, TaskPoolConfig, TickSchedulerConfig};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn test_pool_config_defaults() {
    let cfg = TaskPoolConfig::new();
    assert!(cfg.worker_count >= 1);
    assert_eq!(cfg.thread_name_prefix, "task-pool");
    assert_eq!(cfg.thread_stack_size, None);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_pool_config_invalid_worker_count() {
    let cfg = TaskPoolConfig::new().with_worker_count(0);
    assert_eq!(cfg.validate(), Err("worker_count must be greater than 0".into()));
}

#[test]
fn test_pool_config_invalid_prefix_and_stack() {
    assert!(TaskPoolConfig::new().with_thread_name_prefix("").validate().is_err());
    assert!(TaskPoolConfig::new().with_thread_stack_size(0).validate().is_err());
    assert!(TaskPoolConfig::new()
        .with_thread_stack_size(256 * 1024)
        .validate()
        .is_ok());
}

#[test]
fn test_scheduler_config_builders() {
    let cfg = TickSchedulerConfig::new()
        .with_tick_length_ms(25)
        .with_max_concurrent_tasks(4)
        .with_manual_mode(true)
        .with_start_paused(true);
    assert_eq!(cfg.tick_length(), Duration::from_millis(25));
    assert_eq!(cfg.max_concurrent_tasks, 4);
    assert!(cfg.manual_mode);
    assert!(cfg.start_paused);
    assert!(cfg.validate().is_ok());
    assert!(cfg.with_tick_length_ms(0).validate().is_err());
}

#[test]
fn test_runtime_config_from_json() {
    let json = r#"{
        "pool": { "worker_count": 3, "thread_name_prefix": "render" },
        "scheduler": { "tick_length_ms": 16, "max_concurrent_tasks": 2 }
    }"#;
    let cfg = RuntimeConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.pool.worker_count, 3);
    assert_eq!(cfg.pool.thread_name_prefix, "render");
    assert_eq!(cfg.scheduler.tick_length_ms, 16);
    assert_eq!(cfg.scheduler.max_concurrent_tasks, 2);
    assert!(!cfg.scheduler.manual_mode);
}

#[test]
fn test_runtime_config_json_defaults_missing_sections() {
    let cfg = RuntimeConfig::from_json_str("{}").unwrap();
    assert_eq!(cfg, RuntimeConfig::default());
}

#[test]
fn test_runtime_config_json_errors() {
    let err = RuntimeConfig::from_json_str("{not json").unwrap_err();
    assert!(err.starts_with("parse error"));

    let err = RuntimeConfig::from_json_str(r#"{"pool": {"worker_count": 0}}"#).unwrap_err();
    assert!(err.starts_with("pool invalid"));

    let err = RuntimeConfig::from_json_str(r#"{"scheduler": {"tick_length_ms": 0}}"#).unwrap_err();
    assert!(err.starts_with("scheduler invalid"));
}

#[test]
fn test_runtime_config_from_lookup() {
    let cfg = RuntimeConfig::from_lookup(lookup(&[
        ("TASK_POOL_WORKERS", "6"),
        ("TASK_POOL_STACK_SIZE", "1048576"),
        ("TICK_LENGTH_MS", " 50 "),
        ("TICK_MAX_CONCURRENT", "3"),
        ("TICK_MANUAL_MODE", "yes"),
    ]))
    .unwrap();
    assert_eq!(cfg.pool.worker_count, 6);
    assert_eq!(cfg.pool.thread_stack_size, Some(1_048_576));
    assert_eq!(cfg.scheduler.tick_length_ms, 50);
    assert_eq!(cfg.scheduler.max_concurrent_tasks, 3);
    assert!(cfg.scheduler.manual_mode);
}

#[test]
fn test_runtime_config_from_lookup_rejects_bad_values() {
    let err = RuntimeConfig::from_lookup(lookup(&[("TASK_POOL_WORKERS", "many")])).unwrap_err();
    assert!(err.starts_with("TASK_POOL_WORKERS"));

    let err = RuntimeConfig::from_lookup(lookup(&[("TICK_MANUAL_MODE", "maybe")])).unwrap_err();
    assert!(err.contains("TICK_MANUAL_MODE"));

    assert!(RuntimeConfig::from_lookup(lookup(&[("TICK_LENGTH_MS", "0")])).is_err());
}

#[test]
fn test_runtime_config_empty_lookup_is_default() {
    let cfg = RuntimeConfig::from_lookup(|_| None).unwrap();
    assert_eq!(cfg, RuntimeConfig::default());
}
