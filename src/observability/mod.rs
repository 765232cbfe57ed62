//! Observability for aerosql
//!
//! Structured JSON logs through `tracing`. Every subsystem logs with the
//! `tracing` macros; this module only installs the subscriber.
//!
//! # Principles
//!
//! 1. Logs go to stderr; stdout belongs to CLI responses
//! 2. `RUST_LOG` overrides the configured level
//! 3. Installing twice is a no-op

use tracing_subscriber::EnvFilter;

/// Installs the JSON subscriber at `level` (e.g. "info", "aerosql=debug").
///
/// Returns false when a global subscriber was already set.
pub fn init_logging(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .with_current_span(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
