//! Configuration module for the Pomoisle timer.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `POMOISLE_SERVER_URL` | No | `http://127.0.0.1:5000/api` | Recommendation service base URL |
//! | `POMOISLE_THEME` | No | `study` | Activity theme (`study`, `exercise`, `work`) |
//! | `POMOISLE_TICK_MILLIS` | No | 1000 | Clock period in milliseconds |
//! | `POMOISLE_REQUEST_TIMEOUT_SECS` | No | 10 | Per-request HTTP timeout |
//! | `POMOISLE_FETCH_RETRY_LIMIT` | No | 3 | Recommendation fetch attempts (1-10) |
//!
//! # Example
//!
//! ```no_run
//! use pomoisle_timer::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Server URL: {}", config.server_url);
//! ```

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::types::Theme;

/// Default recommendation service URL.
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000/api";

/// Default clock period in milliseconds.
const DEFAULT_TICK_MILLIS: u64 = 1000;

/// Default per-request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default number of fetch attempts.
const DEFAULT_FETCH_RETRY_LIMIT: u32 = 3;

/// Minimum allowed fetch retry limit.
const MIN_FETCH_RETRY_LIMIT: u32 = 1;

/// Maximum allowed fetch retry limit.
const MAX_FETCH_RETRY_LIMIT: u32 = 10;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Configuration for the Pomoisle timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the recommendation service, without a trailing slash.
    pub server_url: String,

    /// Theme reported with every session and recommendation request.
    pub theme: Theme,

    /// How often the clock ticks. One tick always removes one second from
    /// the timer, so shorter periods speed the timer up.
    pub tick_period: Duration,

    /// Timeout applied to each HTTP request.
    pub request_timeout: Duration,

    /// Attempts made for each recommendation fetch.
    pub fetch_retry_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            theme: Theme::default(),
            tick_period: Duration::from_millis(DEFAULT_TICK_MILLIS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            fetch_retry_limit: DEFAULT_FETCH_RETRY_LIMIT,
        }
    }
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if any variable is set to a value that cannot
    /// be parsed or is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_url = env::var("POMOISLE_SERVER_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());

        let theme = match env::var("POMOISLE_THEME") {
            Ok(val) => val.parse::<Theme>().map_err(|message| ConfigError::InvalidValue {
                key: "POMOISLE_THEME".to_string(),
                message,
            })?,
            Err(_) => Theme::default(),
        };

        let tick_millis = parse_positive("POMOISLE_TICK_MILLIS", DEFAULT_TICK_MILLIS)?;
        let timeout_secs =
            parse_positive("POMOISLE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;

        // Optional: POMOISLE_FETCH_RETRY_LIMIT (default: 3, must be 1-10)
        let fetch_retry_limit = match env::var("POMOISLE_FETCH_RETRY_LIMIT") {
            Ok(val) => {
                let limit = val.parse::<u32>().map_err(|_| ConfigError::InvalidValue {
                    key: "POMOISLE_FETCH_RETRY_LIMIT".to_string(),
                    message: format!("expected integer 1-10, got '{val}'"),
                })?;
                if !(MIN_FETCH_RETRY_LIMIT..=MAX_FETCH_RETRY_LIMIT).contains(&limit) {
                    return Err(ConfigError::InvalidValue {
                        key: "POMOISLE_FETCH_RETRY_LIMIT".to_string(),
                        message: format!(
                            "retry limit must be between {MIN_FETCH_RETRY_LIMIT} and {MAX_FETCH_RETRY_LIMIT}, got {limit}"
                        ),
                    });
                }
                limit
            }
            Err(_) => DEFAULT_FETCH_RETRY_LIMIT,
        };

        Ok(Self {
            server_url,
            theme,
            tick_period: Duration::from_millis(tick_millis),
            request_timeout: Duration::from_secs(timeout_secs),
            fetch_retry_limit,
        })
    }
}

/// Parses an optional positive integer variable, falling back to `default`.
fn parse_positive(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(val) => {
            let parsed = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected positive integer, got '{val}'"),
            })?;
            if parsed == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "value must be greater than 0".to_string(),
                });
            }
            Ok(parsed)
        }
        Err(_) => Ok(default),
    }
}
