//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::{EnvConfig, log_level_directive};

/// Picks the filter directive: `RUST_LOG` wins, then `LOG_LEVEL`, then
/// `warn` for silent runs and `info` otherwise.
#[must_use]
pub fn default_directive(config: &EnvConfig, silent: bool) -> &'static str {
    if let Some(level) = config.log_level.as_deref().and_then(log_level_directive) {
        return level;
    }
    if silent { "warn" } else { "info" }
}

/// Installs the global `fmt` subscriber.
///
/// Safe to call once per process; later calls are ignored.
pub fn init_tracing(config: &EnvConfig, silent: bool) {
    let fallback = default_directive(config, silent);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi_logs)
        .with_target(false)
        .try_init();
}
