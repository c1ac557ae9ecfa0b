//! Executes analytics queries with back-off, then caches the response.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::jitter;
use tracing::{error, info, warn};

use crate::domain::{
    sanitize_response, AnalyticsClient, AnalyticsQuery, MetricsError, ResponseOrigin,
    ResponseStore,
};

/// Maximum attempts per query.
pub const MAX_ATTEMPTS: u32 = 5;

/// Exponential back-off settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Unit of the back-off: attempt `n` waits `2^n` of these plus up to one more.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait before retrying after a failed zero-based `attempt`.
    pub fn wait(&self, attempt: u32, factor: u32) -> Duration {
        let exponential = self.base_delay * 2u32.saturating_pow(attempt);
        (exponential + jitter(self.base_delay)) * factor
    }
}

/// Talks to the analytics API for one query at a time.
pub struct QueryExecutor {
    client: Arc<dyn AnalyticsClient>,
    store: Arc<dyn ResponseStore>,
    retry: RetryPolicy,
}

impl QueryExecutor {
    pub fn new(
        client: Arc<dyn AnalyticsClient>,
        store: Arc<dyn ResponseStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            store,
            retry,
        }
    }

    /// Run `query`, backing off on rate limiting, and cache the result.
    ///
    /// The response is written to the path its own embedded query maps
    /// to. That must be `expected`; anything else means the API answered a
    /// different question than we asked.
    ///
    /// # Errors
    ///
    /// - `RetriesExhausted` after `max_attempts` transient failures
    /// - any non-transient `AnalyticsError`, immediately
    /// - `CachePathMismatch` if the response doesn't match the query
    pub async fn execute(
        &self,
        query: &AnalyticsQuery,
        expected: &Path,
    ) -> Result<Value, MetricsError> {
        if let Err(e) = query.validate() {
            error!("there was an error in constructing your query: {}", e);
            return Err(e.into());
        }

        let max_attempts = self.retry.max_attempts;
        for attempt in 0..max_attempts {
            info!("query attempt {}/{} for {}", attempt + 1, max_attempts, query.unit());
            match self.client.execute(query).await {
                Ok(response) => {
                    let response = sanitize_response(response);
                    self.persist(&response, expected)?;
                    return Ok(response);
                }
                Err(e) if e.is_retryable() => {
                    if attempt + 1 == max_attempts {
                        warn!("{} on final attempt, giving up", e);
                        break;
                    }
                    let wait = self.retry.wait(attempt, e.backoff_factor());
                    warn!("{}, backing off {:?}", e, wait);
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    error!("unhandled analytics error: {}", e);
                    return Err(e.into());
                }
            }
        }

        Err(MetricsError::RetriesExhausted {
            attempts: max_attempts,
        })
    }

    fn persist(&self, response: &Value, expected: &Path) -> Result<PathBuf, MetricsError> {
        let origin = ResponseOrigin::from_response(response)?;
        let derived = self.store.entry_path(origin.kind, origin.unit);
        if derived != expected {
            return Err(MetricsError::CachePathMismatch {
                expected: expected.to_path_buf(),
                derived,
            });
        }
        info!("writing {}", derived.display());
        self.store.write(&derived, response.clone())?;
        Ok(derived)
    }
}
