//! Tracing subscriber setup.
//!
//! Library code only emits `tracing` events. Test binaries and runners call
//! [`init_logging`] once to see them.

use crate::errors::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level is `debug` or `info`.
/// Returns an error if a global subscriber is already installed, which
/// tests that initialize logging more than once can safely ignore.
pub fn init_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| Error::internal(format!("Failed to initialize logging: {}", e)))
}
