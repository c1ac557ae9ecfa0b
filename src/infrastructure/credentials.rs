//! Service-account credentials and OAuth2 bearer tokens.
//!
//! The secrets file is the JSON key downloaded for a service account. It
//! is turned into a short-lived access token by posting a signed RS256
//! assertion to the account's token endpoint.

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::{AnalyticsError, MetricsError};

pub const ANALYTICS_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertions are valid for an hour, the longest the endpoint accepts.
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// First of `candidates` that exists on disk.
///
/// # Errors
///
/// `NoSettingsFound` naming every path that was checked.
pub fn locate_credentials(candidates: &[PathBuf]) -> Result<PathBuf, MetricsError> {
    for path in candidates {
        if path.is_file() {
            info!("using credentials at {}", path.display());
            return Ok(path.clone());
        }
        debug!("no credentials at {}", path.display());
    }
    Err(MetricsError::NoSettingsFound {
        checked: candidates.to_vec(),
    })
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials from {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse service account key {}", path.display()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Classify a failed token exchange.
fn token_error(status: u16, body: &str) -> AnalyticsError {
    match serde_json::from_str::<TokenErrorBody>(body) {
        Ok(e) if e.error == "invalid_grant" || e.error == "unauthorized_client" || status == 401 => {
            AnalyticsError::CredentialsRevoked(format!("{}: {}", e.error, e.error_description))
        }
        Ok(e) => AnalyticsError::Http {
            status,
            reason: e.error,
            message: e.error_description,
        },
        Err(_) => AnalyticsError::Http {
            status,
            reason: "token exchange failed".into(),
            message: body.to_string(),
        },
    }
}

struct CachedToken {
    token: String,
    expires_at: i64,
}

/// Hands out bearer tokens, exchanging a new assertion when the last one lapses.
pub struct TokenProvider {
    http: Client,
    client_email: String,
    token_uri: String,
    signing_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(http: Client, key: ServiceAccountKey) -> Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("Service account private_key is not a valid RSA PEM key")?;
        Ok(Self {
            http,
            client_email: key.client_email,
            token_uri: key.token_uri,
            signing_key,
            cached: Mutex::new(None),
        })
    }

    fn assertion(&self, now: i64) -> Result<String, AnalyticsError> {
        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: ANALYTICS_SCOPE.to_string(),
            aud: self.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| AnalyticsError::CredentialsRevoked(format!("could not sign assertion: {}", e)))
    }

    /// A bearer token valid for at least another minute.
    pub async fn bearer(&self) -> Result<String, AnalyticsError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - EXPIRY_MARGIN_SECS > now {
                return Ok(token.token.clone());
            }
        }

        debug!("exchanging assertion for {} at {}", self.client_email, self.token_uri);
        let assertion = self.assertion(now)?;
        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(token_error(status.as_u16(), &body));
        }
        let granted: TokenResponse = serde_json::from_str(&body)?;
        let expires_in = if granted.expires_in > 0 {
            granted.expires_in
        } else {
            ASSERTION_LIFETIME_SECS
        };
        *cached = Some(CachedToken {
            token: granted.access_token.clone(),
            expires_at: now + expires_in,
        });
        Ok(granted.access_token)
    }
}
