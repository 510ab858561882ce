//! Public SDK surface for Streamlens.
//!
//! This crate re-exports the client building blocks and provides a small
//! initialization helper to keep consumer setup consistent.

/// Re-export for convenience.
pub use streamlens_rs_config as config;
pub use streamlens_rs_core as core;
/// Re-export for convenience.
pub use streamlens_rs_protocol as protocol;

/// Initialize logging through env_logger, honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops. Binaries are expected
/// to call this early in startup to ensure log output is wired up.
pub fn init_logging() {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();
}
