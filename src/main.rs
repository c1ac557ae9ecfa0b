//! eLife article metrics
//!
//! Pulls per-article page views and PDF downloads out of Google Analytics,
//! caching every raw response under the output directory, and prints the
//! aggregated counts as JSON on stdout.
//!
//! # Configuration
//!
//! Configured via `config.yaml` (optional) and environment variables:
//! - `GA_TABLE_ID`: analytics profile, `ga:NNNNNNNN`
//! - `GA_OUTPUT_DIR`: cache root (default: `output`)
//! - `GA_CREDENTIALS`: service account key, checked before the search paths
//! - `GA_CONFIG`: alternate config file
//! - `RUST_LOG`: logging level (default: info)
//! - `LOG_FORMAT`: `text` or `json`
//!
//! # Quick Start
//!
//! ```bash
//! export GA_TABLE_ID="ga:NNNNNNNN"
//! elife-ga-metrics refresh
//! elife-ga-metrics range --from 2015-06-01 --to 2015-06-30 --cached-only
//! ```

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use elife_ga_metrics::application::{
    CachePolicy, MetricsContext, MetricsRequest, MetricsService,
};
use elife_ga_metrics::config::AppConfig;
use elife_ga_metrics::domain::dates::parse_ymd;
use elife_ga_metrics::domain::{AnalyticsClient, MetricsReport};
use elife_ga_metrics::infrastructure::{
    locate_credentials, FileCache, GaClient, ServiceAccountKey, TokenProvider,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    parse_ymd(s).map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

#[derive(Parser, Debug)]
#[command(name = "elife-ga-metrics", version, about = "eLife article metrics from Google Analytics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Last week daily plus the current month, from cache where possible
    Refresh,
    /// Re-query everything since inception, ignoring the cache
    Regenerate,
    /// Metrics for an explicit date range
    Range {
        #[arg(long, value_parser = parse_date)]
        from: NaiveDate,
        #[arg(long, value_parser = parse_date)]
        to: NaiveDate,
        /// One unit per calendar month instead of per day
        #[arg(long)]
        monthly: bool,
        /// Never query the network
        #[arg(long, conflicts_with = "no_cache")]
        cached_only: bool,
        /// Re-query even when a complete cache entry exists
        #[arg(long)]
        no_cache: bool,
        /// Read page views with the URL scheme live at the time
        #[arg(long)]
        site_aware: bool,
    },
    /// Strip identifying fields from every cached response
    Sanitize,
}

fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));

    if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Analytics client, if credentials can be found.
fn build_client(config: &AppConfig) -> Result<Option<Arc<dyn AnalyticsClient>>> {
    let path = match locate_credentials(&config.credentials.search_paths) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!("{} - only cached results are available", e);
            return Ok(None);
        }
    };
    let key = ServiceAccountKey::load(&path)?;
    let http = GaClient::http_client(config.request_timeout())
        .context("Failed to create HTTP client")?;
    let tokens = TokenProvider::new(http.clone(), key)
        .with_context(|| format!("Unusable credentials in {}", path.display()))?;
    Ok(Some(Arc::new(GaClient::new(http, tokens))))
}

fn build_service(config: &AppConfig) -> Result<MetricsService> {
    let client = build_client(config)?;
    let table_id = match (&config.table_id, &client) {
        (Some(id), _) => id.clone(),
        (None, Some(_)) => anyhow::bail!("GA_TABLE_ID is not set - required to query analytics"),
        (None, None) => String::new(),
    };
    let store = Arc::new(FileCache::new(&config.output_dir));
    tracing::info!("caching responses under {}", config.output_dir.display());
    Ok(MetricsService::new(MetricsContext {
        table_id,
        client,
        store,
        retry: config.retry.policy(),
    }))
}

async fn run_all(service: &MetricsService, requests: &[MetricsRequest]) -> Result<MetricsReport> {
    let mut report = MetricsReport::new();
    for request in requests {
        report.extend(
            service
                .article_metrics(request)
                .await
                .with_context(|| format!("Failed to gather metrics for {} to {}", request.from, request.to))?,
        );
    }
    Ok(report)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::load()?;
    let today = Local::now().date_naive();

    let (service, requests) = match cli.command {
        Command::Sanitize => {
            let cache = FileCache::new(&config.output_dir);
            let count = cache
                .sanitize_all()
                .with_context(|| format!("Failed to sanitize {}", config.output_dir.display()))?;
            tracing::info!("sanitized {} cached responses", count);
            return Ok(());
        }
        Command::Refresh => {
            let service = build_service(&config)?;
            let requests = MetricsRequest::refresh(today, service.is_online());
            (service, requests)
        }
        Command::Regenerate => {
            let service = build_service(&config)?;
            anyhow::ensure!(service.is_online(), "regenerate needs credentials to query analytics");
            (service, MetricsRequest::regenerate(today))
        }
        Command::Range {
            from,
            to,
            monthly,
            cached_only,
            no_cache,
            site_aware,
        } => {
            let service = build_service(&config)?;
            let policy = if cached_only {
                CachePolicy::CACHE_ONLY
            } else if no_cache {
                CachePolicy::NO_CACHE
            } else {
                CachePolicy::CACHE_FIRST
            };
            let mut request = if monthly {
                MetricsRequest::monthly(from, to, policy)
            } else {
                MetricsRequest::daily(from, to, policy)
            };
            if site_aware {
                request = request.site_aware();
            }
            (service, vec![request])
        }
    };

    let report = run_all(&service, &requests).await?;
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    println!("{}", json);
    Ok(())
}
