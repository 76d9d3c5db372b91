//! Process-wide settings loaded from environment variables, plus the
//! string coercions shared by every tool's command line.
//!
//! Per-tool options are command line flags (see [`crate::cli`]); the
//! settings here apply to all tools and come from the environment (or a
//! `.env` file via `dotenvy`).

use std::time::Duration;

use crate::error::LoadgenError;

/// Settings shared by all tools.
///
/// Loaded once at startup via [`EnvConfig::from_env`].
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Raw `LOG_LEVEL` value, if set. Accepts level names or the numeric
    /// levels `10`, `20`, `30`, `40`, `50`.
    pub log_level: Option<String>,

    /// Seconds to wait for a broker CONNACK or a database connection.
    pub connect_timeout_secs: u64,

    /// Capacity of the client request queue. Publishers wait when it is
    /// full.
    pub request_queue_capacity: usize,

    /// Whether log lines carry ANSI colour codes.
    pub ansi_logs: bool,
}

impl EnvConfig {
    /// Loads settings from environment variables.
    ///
    /// Falls back to defaults when a variable is missing or invalid.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let log_level = std::env::var("LOG_LEVEL").ok().filter(|v| !v.is_empty());
        let connect_timeout_secs = parse_env("LOADGEN_CONNECT_TIMEOUT_SECS", 10);
        let request_queue_capacity = parse_env("LOADGEN_REQUEST_QUEUE_CAPACITY", 1000);
        let ansi_logs = parse_env_bool("LOADGEN_ANSI_LOGS", true);

        Self {
            log_level,
            connect_timeout_secs,
            request_queue_capacity,
            ansi_logs,
        }
    }

    /// Returns the connect timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            connect_timeout_secs: 10,
            request_queue_capacity: 1000,
            ansi_logs: true,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
pub fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean using [`parse_bool_flag`].
/// Returns `default` when missing or unrecognised.
pub fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_bool_flag(&v).ok())
        .unwrap_or(default)
}

/// Parses a boolean flag value. Accepts `yes/true/t/y/1` and
/// `no/false/f/n/0`, case-insensitive.
///
/// # Errors
///
/// Returns [`LoadgenError::InvalidArgument`] for anything else.
pub fn parse_bool_flag(raw: &str) -> Result<bool, LoadgenError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "t" | "y" | "1" => Ok(true),
        "no" | "false" | "f" | "n" | "0" => Ok(false),
        other => Err(LoadgenError::InvalidArgument(format!(
            "boolean value expected, got {other:?}"
        ))),
    }
}

/// Converts a delay in (fractional) seconds to a [`Duration`].
///
/// # Errors
///
/// Returns [`LoadgenError::InvalidArgument`] for negative, NaN or
/// overflowing values.
pub fn delay_from_secs(secs: f64) -> Result<Duration, LoadgenError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| LoadgenError::InvalidArgument(format!("delay {secs}: {e}")))
}

/// Maps a `LOG_LEVEL` value to a `tracing` filter directive.
///
/// Numeric values follow the usual logging ladder (10 debug, 20 info,
/// 30 warn, 40 error, 50 error); names pass through lowercased.
#[must_use]
pub fn log_level_directive(raw: &str) -> Option<&'static str> {
    let value = raw.trim().to_ascii_lowercase();
    if let Ok(n) = value.parse::<u32>() {
        return Some(match n {
            0..=5 => "trace",
            6..=10 => "debug",
            11..=20 => "info",
            21..=30 => "warn",
            _ => "error",
        });
    }
    match value.as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" => Some("error"),
        _ => None,
    }
}
