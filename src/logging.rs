//! Minimal `tracing` subscriber installer. This crate is a library, not
//! a server, so it carries only what examples and tests need to see the
//! instrumentation already placed in the core operations — nothing like
//! the structured JSON/production logging configuration a service would
//! carry.

use tracing_subscriber::EnvFilter;

/// Install a global subscriber that reads its filter from `RUST_LOG`,
/// defaulting to `warn`. Idempotent: only the first call takes effect,
/// later calls are silently ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
