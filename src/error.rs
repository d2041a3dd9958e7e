//! Error types for the ingestion and submission pipeline.
//!
//! The taxonomy mirrors the trust boundaries of the tool:
//! - [`ValidationError`]: bad input data, never retried, always reported with
//!   the row/field at fault
//! - [`FileError`] / [`IngestError`]: batch-level structural problems that
//!   abort the whole batch
//! - [`ClientError`]: submission-side failures, split into validation
//!   (not retried), connection (retried with backoff before surfacing) and
//!   unexpected (not retried, logged with context)

use std::path::PathBuf;

use thiserror::Error;

/// One or more field-level validation failures for a single record.
///
/// All field errors for a row are collected before this is raised, so the
/// message may span multiple lines (one per failed check).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", messages.join("\n"))]
pub struct ValidationError {
    /// Individual human-readable messages, one per failed check.
    pub messages: Vec<String>,
}

impl ValidationError {
    pub fn new(messages: Vec<String>) -> Self {
        ValidationError { messages }
    }

    pub fn single(message: impl Into<String>) -> Self {
        ValidationError {
            messages: vec![message.into()],
        }
    }
}

/// File-level precondition failures, checked before any CSV parsing starts.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Not a file: {0}")]
    NotAFile(PathBuf),

    #[error("Not a CSV file: {0}")]
    NotCsv(PathBuf),

    #[error("File is empty: {0}")]
    Empty(PathBuf),

    #[error("File too large: {size_mb:.2}MB (max {max_mb}MB)")]
    TooLarge { size_mb: f64, max_mb: u64 },
}

/// Errors raised while parsing a batch CSV file.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    File(#[from] FileError),

    /// The header row is missing columns the schema requires.
    #[error("CSV missing required columns: {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    /// Non-UTF-8 byte sequences in the input. Distinct from validation
    /// errors so callers can tell a broken file from broken data.
    #[error("File encoding error. Please ensure file is UTF-8 encoded: {0}")]
    Encoding(String),

    #[error("CSV parsing error: {0}")]
    Malformed(String),

    /// A row failed validation and `skip_invalid` was not set.
    #[error("{source}")]
    Row { row: usize, source: ValidationError },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors surfaced by the remote-platform transport layer.
///
/// `is_transient` drives the retry predicate: only network-class failures
/// and retryable HTTP statuses are worth another attempt.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("MISP returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response from MISP: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            ApiError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}

/// Errors returned by the submission client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The remote call kept failing transiently until the retry budget ran
    /// out. Carries the attempt count and the last underlying error.
    #[error("Failed after {attempts} attempts: {message}")]
    Connection { attempts: usize, message: String },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Configuration loading/validation failures, reported at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Required environment variable '{0}' is not set. Please set it in your .env file or environment.")]
    MissingVar(String),

    #[error("MISP_URL must start with http:// or https://, got: {0}")]
    BadUrlScheme(String),

    #[error("MISP_URL is not a valid URL: {0}")]
    BadUrl(String),

    #[error("MISP_API_KEY appears to be invalid (too short)")]
    ShortApiKey,

    #[error("MISP_TIMEOUT must be positive, got: {0}")]
    BadTimeout(i64),

    #[error("MISP_MAX_RETRIES must be non-negative, got: {0}")]
    BadMaxRetries(i64),

    #[error(".env file not found: {0}")]
    EnvFileNotFound(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_joins_messages_with_newlines() {
        let err = ValidationError::new(vec![
            "Row 2: Invalid attacker IP address '999.1.1.1'".to_string(),
            "Row 2: Invalid destination port '70000'".to_string(),
        ]);
        let rendered = err.to_string();
        assert_eq!(rendered.lines().count(), 2);
        assert!(rendered.contains("999.1.1.1"));
        assert!(rendered.contains("70000"));
    }

    #[test]
    fn transient_classification() {
        assert!(ApiError::Transport("connection reset".into()).is_transient());
        assert!(ApiError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(ApiError::Status {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(!ApiError::Status {
            status: 403,
            body: String::new()
        }
        .is_transient());
        assert!(!ApiError::Decode("not json".into()).is_transient());
    }

    #[test]
    fn connection_error_mentions_attempts() {
        let err = ClientError::Connection {
            attempts: 3,
            message: "timed out".into(),
        };
        assert!(err.to_string().contains("3 attempts"));
    }
}
