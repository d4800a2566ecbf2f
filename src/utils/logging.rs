//! Structured logging setup
//!
//! Builds a `tracing_subscriber::fmt` subscriber from [`LoggingConfig`]. `RUST_LOG`
//! takes precedence over the configured level when it is set.

use crate::config::LoggingConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// Returns false if a subscriber was already installed (tests, embedding apps);
/// the existing one is left in place.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false);

    let installed = if config.json_format {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        debug!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    }
    installed
}
