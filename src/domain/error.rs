use std::path::PathBuf;
use thiserror::Error;

use super::dates::DateUnit;

/// Reasons the analytics API gives for a 403 that is worth retrying.
pub const RATE_LIMIT_REASONS: [&str; 2] = ["rateLimitExceeded", "userRateLimitExceeded"];

/// Failure of a single analytics query.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("rate limited by analytics API ({reason})")]
    RateLimited { reason: String },
    #[error("analytics API unavailable (503)")]
    ServiceUnavailable,
    #[error("analytics API error {status} ({reason}): {message}")]
    Http {
        status: u16,
        reason: String,
        message: String,
    },
    #[error("error constructing query: {0}")]
    MalformedQuery(String),
    #[error("credentials have been revoked or expired, re-authorize and try again: {0}")]
    CredentialsRevoked(String),
    #[error("request error")]
    Transport(#[from] reqwest::Error),
    #[error("serde_json error")]
    Decode(#[from] serde_json::Error),
}

impl AnalyticsError {
    /// Classify an HTTP error status and its first reported reason.
    pub fn from_status(status: u16, reason: &str, message: &str) -> Self {
        match status {
            403 if RATE_LIMIT_REASONS.contains(&reason) => AnalyticsError::RateLimited {
                reason: reason.to_string(),
            },
            503 => AnalyticsError::ServiceUnavailable,
            401 => AnalyticsError::CredentialsRevoked(message.to_string()),
            _ => AnalyticsError::Http {
                status,
                reason: reason.to_string(),
                message: message.to_string(),
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalyticsError::RateLimited { .. } | AnalyticsError::ServiceUnavailable
        )
    }

    /// Multiplier applied to the back-off wait.
    pub fn backoff_factor(&self) -> u32 {
        match self {
            AnalyticsError::ServiceUnavailable => 2,
            _ => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache io error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache entry {path} is not valid json")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Run-level failure. Anything here aborts the whole run.
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("query failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
    #[error("response would be cached at {derived} but {expected} was requested")]
    CachePathMismatch { expected: PathBuf, derived: PathBuf },
    #[error("unexpected analytics response: {0}")]
    InvalidResponse(String),
    #[error("no settings found, checked: {}", display_paths(.checked))]
    NoSettingsFound { checked: Vec<PathBuf> },
    #[error("unit {unit} must be fetched but no analytics client is configured")]
    OfflineFetch { unit: DateUnit },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
