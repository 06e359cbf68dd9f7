//! Logging setup for tablekv.
//!
//! The library only emits `tracing` events. These helpers install a
//! subscriber for binaries and tests that want to see them.

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

/// Install a subscriber at `info`, overridable through `RUST_LOG`.
///
/// ```rust
/// tablekv_core::logging::init();
/// ```
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level("info")
}

/// Install a subscriber with `level` as the default filter.
///
/// `RUST_LOG` takes precedence. Calling this twice is harmless.
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .try_init();
}

/// Debug-level output captured by the test harness.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("tablekv_core=debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}
