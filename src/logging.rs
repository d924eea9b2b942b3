//! Structured logging setup, built on `tracing` + `tracing-subscriber`
//! rather than hand-rolled stderr writes.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber. `debug` widens the default
/// filter from `info` to `debug` for this crate; `RUST_LOG` always
/// overrides both.
pub fn init(debug: bool) {
    let default_directive = if debug { "loadfabric=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .json()
        .init();
}
