//! Tracing setup for binaries and integration tests.

use tracing_subscriber::EnvFilter;

/// Installs a formatted tracing subscriber with env-filter support and
/// bridges `log` records into tracing. Safe to call more than once;
/// later calls are no-ops.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_log::LogTracer::init();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
