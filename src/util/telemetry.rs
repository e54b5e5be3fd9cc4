//! Telemetry helpers for structured logging.

/// Install a default env-filtered fmt subscriber unless one is already set.
///
/// Filter with `RUST_LOG`, e.g. `RUST_LOG=prometheus_task_pool=debug`.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_names(true)
        .try_init();
}
