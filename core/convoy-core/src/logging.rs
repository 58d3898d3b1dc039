//! Tracing subscriber setup, behind the `logging` feature.
//!
//! The library itself only emits `tracing` events; binaries embedding the
//! core call one of these to get formatted output. Without the feature
//! every function is a no-op.

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

/// Install a subscriber filtered by `RUST_LOG`, defaulting to `info`.
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level("info")
}

/// Install a subscriber with an explicit default level (`trace`, `debug`,
/// `info`, `warn`, `error`); `RUST_LOG` still takes precedence.
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Subscriber for tests: debug level, captured per test. Safe to call from
/// every test; only the first call installs anything.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}
