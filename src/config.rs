//! Runtime configuration: `config.yaml` first, then environment overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::application::RetryPolicy;
use crate::infrastructure::ga_client::REQUEST_TIMEOUT_SECS;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Top-level application configuration loaded from `config.yaml`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Analytics profile to query, `ga:NNNNNNNN`.
    pub table_id: Option<String>,
    /// Root of the response cache.
    pub output_dir: PathBuf,
    pub credentials: CredentialsConfig,
    pub retry: RetryConfig,
    pub request_timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Checked in order; the first file that exists wins.
    pub search_paths: Vec<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            table_id: None,
            output_dir: PathBuf::from("output"),
            credentials: CredentialsConfig::default(),
            retry: RetryConfig::default(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        let mut search_paths = vec![PathBuf::from("client-secrets.json")];
        if let Some(home) = env::var_os("HOME") {
            search_paths.push(
                PathBuf::from(home).join(".config/elife-ga-metrics/client-secrets.json"),
            );
        }
        search_paths.push(PathBuf::from("/etc/elife-ga-metrics/client-secrets.json"));
        Self { search_paths }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

impl AppConfig {
    /// Load from `GA_CONFIG` (or `config.yaml`), then apply `GA_*` overrides.
    ///
    /// A missing default config file is not an error; a missing file named
    /// explicitly through `GA_CONFIG` is.
    pub fn load() -> Result<Self> {
        let explicit = env::var("GA_CONFIG").ok();
        let path = explicit
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if explicit.is_some() || Path::new(&path).exists() {
            Self::from_file(Path::new(&path))?
        } else {
            debug!("no {} found, using defaults", path);
            Self::default()
        };
        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {} - check YAML syntax and structure", path.display()))?;
        info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `GA_TABLE_ID`, `GA_OUTPUT_DIR` and `GA_CREDENTIALS` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(table_id) = lookup("GA_TABLE_ID").filter(|v| !v.is_empty()) {
            self.table_id = Some(table_id);
        }
        if let Some(dir) = lookup("GA_OUTPUT_DIR").filter(|v| !v.is_empty()) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(creds) = lookup("GA_CREDENTIALS").filter(|v| !v.is_empty()) {
            self.credentials.search_paths.insert(0, PathBuf::from(creds));
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
