//! # Prometheus Task Pool
//!
//! A work-stealing thread pool and a discrete-time tick scheduler that
//! dispatches onto it.
//!
//! ## TaskPool
//!
//! Each worker owns a double-ended queue. Owners push and pop at the head;
//! idle workers steal from the tail of their neighbours. Work submitted from
//! inside a worker stays on that worker's queue, so recursive fan-out keeps
//! its cache locality.
//!
//! ```rust
//! use prometheus_task_pool::core::TaskPool;
//!
//! let pool = TaskPool::new(4)?;
//! let handle = pool.enqueue(|| 6 * 7)?;
//! assert_eq!(handle.wait()?, 42);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## TickScheduler
//!
//! A single clock thread advances a monotonic tick counter, either on a fixed
//! interval or on explicit triggers, and releases tasks whose target tick has
//! arrived and whose dependencies have completed. The scheduler holds only a
//! weak reference to its executor; when the executor is gone, tasks run
//! inline on the clock thread.
//!
//! ```rust
//! use std::time::Duration;
//! use prometheus_task_pool::builders::build_runtime;
//! use prometheus_task_pool::config::RuntimeConfig;
//!
//! let mut cfg = RuntimeConfig::default();
//! cfg.scheduler.manual_mode = true;
//! let (_pool, scheduler) = build_runtime(&cfg)?;
//!
//! let load = scheduler.schedule_task(1, || println!("load"));
//! let render = scheduler.schedule_task(1, || println!("render"));
//! scheduler.add_dependency(&render, &load)?;
//!
//! scheduler.trigger_tasks();
//! assert!(render.wait_completion(Duration::from_secs(5)).is_some());
//! assert!(load.is_completed());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! For more, see `tests/task_pool_test.rs` and `tests/tick_scheduler_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Work-stealing pool, tick scheduler, and their shared abstractions.
pub mod core;
/// Configuration models for the pool and the scheduler.
pub mod config;
/// Builders to construct runtime components from configuration.
pub mod builders;
/// Runtime adapters implementing the executor seam.
pub mod runtime;
/// Shared utilities.
pub mod util;
