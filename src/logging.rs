//! Tracing subscriber setup for binaries, demos and benches.
//!
//! The library itself only emits `tracing` events; it never installs a
//! subscriber unless one of these functions is called.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "fleet_sim=info";

/// Install a compact fmt subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_FILTER`]. Returns false if a global subscriber already exists.
pub fn init() -> bool {
    init_with_filter(DEFAULT_FILTER)
}

pub fn init_with_filter(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .is_ok()
}
