//! Telemetry helpers for structured logging and tracing.

/// Filter used when `RUST_LOG` is unset or invalid: engine lifecycle at
/// `info`, worker and retry chatter hidden.
pub const DEFAULT_LOG_FILTER: &str = "prometheus_task_engine=info";

/// Initialize tracing/telemetry. Users can install their own subscriber; this
/// helper installs a default env-based subscriber if none is set.
///
/// Filtering follows `RUST_LOG`, e.g. `RUST_LOG=prometheus_task_engine=debug`,
/// falling back to [`DEFAULT_LOG_FILTER`]. Worker threads are named
/// `task-worker-N`, so lines carry the thread name. Safe to call repeatedly.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
