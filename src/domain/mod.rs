//! Domain layer - value types and the traits collaborators implement.
//!
//! Everything here is a pure value or an interface. The only persistent
//! mutable state in the system (the JSON cache tree) sits behind
//! [`ResponseStore`]; the network sits behind [`AnalyticsClient`].

pub mod analytics;
pub mod article;
pub mod dates;
pub mod error;
pub mod report;

pub use analytics::{response_filters, response_rows, sanitize_response, AnalyticsQuery, RawRow, ResponseOrigin};
pub use article::{deplumpen, enplumpen, ArticleId, MetricKind, ViewBreakdown, ViewType};
pub use dates::{ymd, DateUnit, DOWNLOADS_INCEPTION, VIEWS_INCEPTION};
pub use error::{AnalyticsError, CacheError, MetricsError};
pub use report::{DownloadCounts, MetricsReport, UnitMetrics, ViewCounts};

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Issues raw queries against the analytics reporting API.
///
/// One call is one blocking round trip; retrying is the caller's business.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalyticsClient: Send + Sync {
    /// Execute the query and return the parsed JSON response.
    ///
    /// # Errors
    ///
    /// - `RateLimited` / `ServiceUnavailable` for transient API refusals
    /// - `CredentialsRevoked` when the token is no longer accepted
    /// - `MalformedQuery` / `Http` for everything the API won't answer
    async fn execute(&self, query: &AnalyticsQuery) -> Result<Value, AnalyticsError>;
}

/// What the cache holds for one (kind, unit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    /// Authoritative result for a window fully in the past.
    Final(PathBuf),
    /// Window still open; a `.partial` file exists.
    Partial(PathBuf),
    /// Window is now closed but only the old `.partial` file exists.
    StalePartial(PathBuf),
    /// Nothing on disk.
    Absent,
}

/// Deterministic on-disk storage for sanitized responses.
pub trait ResponseStore: Send + Sync {
    /// Where the response for `(kind, unit)` lives, as of today.
    fn entry_path(&self, kind: MetricKind, unit: DateUnit) -> PathBuf;

    fn entry_state(&self, kind: MetricKind, unit: DateUnit) -> EntryState;

    fn read(&self, path: &Path) -> Result<Value, CacheError>;

    /// Sanitize and write a response, creating parent directories.
    fn write(&self, path: &Path, response: Value) -> Result<(), CacheError>;
}
