//! Configuration models for the pool and the tick scheduler.

pub mod pool;

pub use pool::{RuntimeConfig, TaskPoolConfig, TickSchedulerConfig};
