//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/telemetry. Hosts can install their own subscriber; this
/// helper installs an env-based subscriber if none is set yet, defaulting to
/// info-level engine events when `RUST_LOG` is absent.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("resource_disposer=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
