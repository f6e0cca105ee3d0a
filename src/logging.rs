//! Logging configuration.
//!
//! stdout carries the JSON envelope only, so every log line goes to stderr.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "warn";

/// Builds the filter from `RUST_LOG`, falling back to `fallback`.
pub fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Initializes logging to stderr.
///
/// `verbose` raises the fallback level to `debug`, which includes generated SQL.
pub fn init_stderr_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { DEFAULT_FILTER };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(fallback))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
