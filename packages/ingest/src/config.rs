//! Ingestion settings read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use quake_map_source::retry::RetryPolicy;
use quake_map_source::usgs::DEFAULT_FEED_URL;

/// Number of full months before the current one to keep landed.
pub const MONTHS_ENV: &str = "EXTRACTOR_MONTHS";
/// Pause between months.
pub const SLEEP_SECONDS_ENV: &str = "EXTRACTOR_SLEEP_SECONDS";
/// Retries per feed request.
pub const MAX_RETRIES_ENV: &str = "EXTRACTOR_MAX_RETRIES";
/// Per-request timeout.
pub const TIMEOUT_SECONDS_ENV: &str = "EXTRACTOR_TIMEOUT_SECONDS";
/// Set to `false` to disable the autorun entirely.
pub const BOOTSTRAP_ENV: &str = "EXTRACTOR_BOOTSTRAP";
/// Root directory of the Parquet lake export.
pub const LAKE_ROOT_ENV: &str = "LAKE_ROOT";
/// FDSN event query endpoint.
pub const FEED_URL_ENV: &str = "QUAKE_MAP_FEED_URL";

/// An environment variable holds a value that cannot be used.
#[derive(Debug, thiserror::Error)]
#[error("Invalid value {value:?} for {var}: {message}")]
pub struct ConfigError {
    /// Variable name.
    pub var: &'static str,
    /// Raw value.
    pub value: String,
    /// What was expected.
    pub message: String,
}

/// Settings for one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub months_back: u32,
    pub sleep: Duration,
    pub max_retries: u32,
    pub timeout: Duration,
    pub bootstrap: bool,
    pub lake_root: Option<PathBuf>,
    pub feed_url: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            months_back: 12,
            sleep: Duration::from_secs(1),
            max_retries: 3,
            timeout: Duration::from_secs(120),
            bootstrap: true,
            lake_root: None,
            feed_url: DEFAULT_FEED_URL.to_string(),
        }
    }
}

impl IngestConfig {
    /// Reads the settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to a value that does
    /// not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through `lookup`, falling back to the defaults
    /// for unset or blank variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to a value that does
    /// not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            months_back: parse_or(MONTHS_ENV, get(MONTHS_ENV), defaults.months_back)?,
            sleep: Duration::from_secs(parse_or(
                SLEEP_SECONDS_ENV,
                get(SLEEP_SECONDS_ENV),
                defaults.sleep.as_secs(),
            )?),
            max_retries: parse_or(MAX_RETRIES_ENV, get(MAX_RETRIES_ENV), defaults.max_retries)?,
            timeout: Duration::from_secs(parse_or(
                TIMEOUT_SECONDS_ENV,
                get(TIMEOUT_SECONDS_ENV),
                defaults.timeout.as_secs(),
            )?),
            bootstrap: get(BOOTSTRAP_ENV)
                .map_or(Ok(defaults.bootstrap), |v| parse_bool(BOOTSTRAP_ENV, &v))?,
            lake_root: get(LAKE_ROOT_ENV).map(PathBuf::from),
            feed_url: get(FEED_URL_ENV).unwrap_or(defaults.feed_url),
        })
    }

    /// Retry policy for feed requests.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            ..RetryPolicy::default()
        }
    }
}

fn parse_or<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError {
            var,
            message: e.to_string(),
            value: raw,
        }),
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError {
            var,
            value: raw.to_string(),
            message: "expected true or false".to_string(),
        }),
    }
}
