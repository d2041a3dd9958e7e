//! Application configuration and constants.
//!
//! Settings come from environment variables (optionally loaded from a `.env`
//! file), validated once at startup so the rest of the pipeline can assume a
//! sane base URL, credential and timeouts.

use std::env;
use std::time::Duration;

use clap::ValueEnum;
use log::warn;
use url::Url;

use crate::error::ConfigError;

// Validation limits (MISP DDoS playbook)
pub const MAX_EVENT_NAME_LEN: usize = 255;
pub const MAX_ANNOTATION_LEN: usize = 5000;
/// Cap on semicolon-separated IP lists. Guards against DoS via huge uploads.
pub const MAX_IP_LIST_LEN: usize = 1000;

// Batch file limits
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 10;

// Remote call defaults
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Total attempts per remote call (first try + retries).
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
/// Backoff between attempts is `BACKOFF_FACTOR_SECS ^ attempt` seconds.
pub const BACKOFF_FACTOR_SECS: u64 = 2;

/// Accepted event date formats, tried in order.
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y-%m-%d %H:%M:%S"];

/// Logging level for the application.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// - `Plain`: human-readable with colors (default)
/// - `Json`: structured JSON for machine parsing
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormat {
    Plain,
    Json,
}

/// Validated MISP connection settings.
///
/// The API key is excluded from the `Debug` output so it cannot leak
/// through logs.
#[derive(Clone)]
pub struct Settings {
    /// MISP base URL, trailing slash stripped.
    pub misp_url: String,
    pub misp_api_key: String,
    /// Whether to verify TLS certificates. Disable only for trusted
    /// self-hosted instances.
    pub verify_ssl: bool,
    pub timeout: Duration,
    /// Total attempts per remote call.
    pub max_attempts: usize,
    /// Maximum batch file size in megabytes.
    pub max_file_size_mb: u64,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("misp_url", &self.misp_url)
            .field("misp_api_key", &"<redacted>")
            .field("verify_ssl", &self.verify_ssl)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("max_file_size_mb", &self.max_file_size_mb)
            .finish()
    }
}

impl Settings {
    /// Loads settings from the process environment and validates them.
    ///
    /// Required: `MISP_URL`, `MISP_API_KEY`. Optional with defaults:
    /// `MISP_VERIFY_SSL`, `MISP_TIMEOUT`, `MISP_MAX_RETRIES`,
    /// `MISP_MAX_FILE_SIZE_MB`. Malformed optional values fall back to
    /// their defaults with a warning. `LOG_LEVEL` is read separately by
    /// [`log_level_from_env`] before the logger exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        let misp_url = required_var("MISP_URL")?;
        let misp_api_key = required_var("MISP_API_KEY")?;

        let verify_ssl = bool_var("MISP_VERIFY_SSL", true);
        let timeout_secs = int_var("MISP_TIMEOUT", DEFAULT_TIMEOUT_SECS as i64);
        let max_retries = int_var("MISP_MAX_RETRIES", DEFAULT_MAX_ATTEMPTS as i64);
        let max_file_size_mb = int_var("MISP_MAX_FILE_SIZE_MB", DEFAULT_MAX_FILE_SIZE_MB as i64);

        let settings = Settings {
            misp_url: misp_url.trim_end_matches('/').to_string(),
            misp_api_key,
            verify_ssl,
            timeout: Duration::from_secs(timeout_secs.max(0) as u64),
            max_attempts: max_retries.max(0) as usize,
            max_file_size_mb: max_file_size_mb.max(1) as u64,
        };

        settings.validate(timeout_secs, max_retries)?;
        Ok(settings)
    }

    fn validate(&self, timeout_secs: i64, max_retries: i64) -> Result<(), ConfigError> {
        let parsed = Url::parse(&self.misp_url)
            .map_err(|e| ConfigError::BadUrl(format!("{}: {}", self.misp_url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::BadUrlScheme(self.misp_url.clone()));
        }

        // Basic sanity check only. A real MISP auth key is 40 characters.
        if self.misp_api_key.len() < 10 {
            return Err(ConfigError::ShortApiKey);
        }

        if timeout_secs <= 0 {
            return Err(ConfigError::BadTimeout(timeout_secs));
        }

        if max_retries < 0 {
            return Err(ConfigError::BadMaxRetries(max_retries));
        }

        Ok(())
    }
}

/// The log level from `LOG_LEVEL`, defaulting to info. Malformed values
/// fall back to the default; `--log-level` overrides this entirely.
///
/// The single place `LOG_LEVEL` is interpreted: the binary calls this before
/// logger initialization, so nothing else should re-parse the variable.
pub fn log_level_from_env() -> log::LevelFilter {
    match env::var("LOG_LEVEL") {
        Ok(v) => v
            .trim()
            .parse::<log::LevelFilter>()
            .unwrap_or(log::LevelFilter::Info),
        Err(_) => log::LevelFilter::Info,
    }
}

fn required_var(key: &str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::MissingVar(key.to_string())),
    }
}

fn bool_var(key: &str, default: bool) -> bool {
    let Ok(value) = env::var(key) else {
        return default;
    };
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        other => {
            warn!("Invalid boolean value for {key}: {other}. Using default: {default}");
            default
        }
    }
}

fn int_var(key: &str, default: i64) -> i64 {
    let Ok(value) = env::var(key) else {
        return default;
    };
    value.trim().parse::<i64>().unwrap_or_else(|_| {
        warn!("Invalid integer value for {key}: {value}. Using default: {default}");
        default
    })
}
