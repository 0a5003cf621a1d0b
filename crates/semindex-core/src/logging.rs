//! Tracing subscriber setup for hosts that do not install their own.

use tracing_subscriber::EnvFilter;

use crate::error::{IndexError, Result};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `level` (e.g. from
/// `GeneralConfig::log_level`) is used. Fails if a global subscriber is
/// already set.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| IndexError::Config(format!("Invalid log level '{}': {}", level, e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| IndexError::Config(format!("Failed to install subscriber: {}", e)))
}
