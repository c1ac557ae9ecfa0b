//! HTTP client for the Core Reporting API (v3).
//!
//! One call is one request: retrying is the query executor's job, so a
//! failure here is classified and handed straight back.

use async_trait::async_trait;
use reqwest::{Client, Request};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::credentials::TokenProvider;
use crate::domain::{AnalyticsClient, AnalyticsError, AnalyticsQuery};

/// Core Reporting API endpoint.
pub const DATA_URL: &str = "https://www.googleapis.com/analytics/v3/data/ga";

/// Request timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}

/// Classify a non-success response by status and the first reported reason.
pub fn parse_error_body(status: u16, body: &str) -> AnalyticsError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let reason = envelope
                .error
                .errors
                .first()
                .map(|d| d.reason.as_str())
                .unwrap_or_default();
            AnalyticsError::from_status(status, reason, &envelope.error.message)
        }
        Err(_) => AnalyticsError::from_status(status, "", body),
    }
}

pub struct GaClient {
    http: Client,
    tokens: TokenProvider,
    url: String,
}

impl GaClient {
    pub fn new(http: Client, tokens: TokenProvider) -> Self {
        Self {
            http,
            tokens,
            url: DATA_URL.to_string(),
        }
    }

    /// Shared HTTP client with the request timeout applied.
    pub fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("elife-ga-metrics/", env!("CARGO_PKG_VERSION")))
            .build()
    }
}

fn data_request(
    http: &Client,
    url: &str,
    query: &AnalyticsQuery,
    token: &str,
) -> Result<Request, reqwest::Error> {
    http.get(url)
        .bearer_auth(token)
        .header("Accept", "application/json")
        .query(&query.params())
        .build()
}

#[async_trait]
impl AnalyticsClient for GaClient {
    async fn execute(&self, query: &AnalyticsQuery) -> Result<Value, AnalyticsError> {
        let token = self.tokens.bearer().await?;
        let request = data_request(&self.http, &self.url, query, &token)?;
        debug!("GET {}", request.url());

        let response = self.http.execute(request).await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_error_body(status.as_u16(), &body));
        }
        Ok(serde_json::from_str(&body)?)
    }
}
