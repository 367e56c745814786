//! Logging setup
//!
//! The library only emits `tracing` events. Applications (and the CLI)
//! install a subscriber with [`init_logging`].

use crate::error::{Error, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber writing to stderr.
///
/// `RUST_LOG` directives take precedence over `level`. Fails instead of
/// panicking if a global subscriber is already installed.
pub fn init_logging(level: Level) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to initialize logging: {e}")))
}
