//! Build a `TaskPool` and a `TickScheduler` wired to it.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::RuntimeConfig;
use crate::core::{AppResult, TaskPool, TickScheduler};

/// Validate `cfg`, start the pool, and start a scheduler that dispatches onto
/// it through a weak handle.
///
/// The caller owns the pool. Dropping the returned `Arc` leaves the scheduler
/// running every task inline on its clock thread.
///
/// # Errors
///
/// Invalid configuration, or a worker/clock thread that failed to start.
pub fn build_runtime(cfg: &RuntimeConfig) -> AppResult<(Arc<TaskPool>, TickScheduler)> {
    cfg.validate()
        .map_err(|e| anyhow::anyhow!("config invalid: {e}"))?;

    let pool = Arc::new(
        TaskPool::with_config(cfg.pool.clone()).context("failed to start task pool")?,
    );
    let scheduler = TickScheduler::with_spawner(cfg.scheduler.clone(), &pool)
        .context("failed to start tick scheduler")?;

    info!(
        workers = pool.thread_count(),
        tick_length_ms = cfg.scheduler.tick_length_ms,
        "Runtime built"
    );
    Ok((pool, scheduler))
}
