//! Logging system setup
//!
//! Initializes the global `tracing` subscriber. Per-connection event logs are
//! mirrored into it. Logs go to stderr so that command output on stdout stays
//! machine-readable.

use crate::config::LoggingSettings;
use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging system
///
/// # Arguments
/// * `settings` - Level and format from the configuration file
///
/// # Environment Variables
/// * `RUST_LOG` - Overrides the configured level (e.g., "debug", "whitelist_core=trace")
///
/// Fails if a global subscriber is already installed.
pub fn setup_logging(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.level));

    if settings.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false).with_writer(std::io::stderr))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_setup_only_once() {
        let settings = LoggingSettings::default();

        // Whichever call installed the subscriber, later ones must fail.
        let _ = setup_logging(&settings);
        assert!(setup_logging(&settings).is_err());
        assert!(setup_logging(&settings).is_err());
    }
}
