//! Use cases: classify, aggregate, plan, gate the cache, query, orchestrate.

pub mod aggregator;
pub mod cache_gate;
pub mod classifier;
pub mod grammar;
pub mod metrics_service;
pub mod query_executor;
pub mod range_planner;

pub use aggregator::{aggregate_downloads, aggregate_views, ViewTally};
pub use cache_gate::{CachePlan, CachePolicy};
pub use classifier::{classify_articles_path, classify_content_path, download_label_article, Classification};
pub use grammar::{grammar_for, SiteVersion, UrlGrammar, SITE_SWITCH};
pub use metrics_service::{MetricsContext, MetricsRequest, MetricsService, SiteSelection};
pub use query_executor::{QueryExecutor, RetryPolicy};
pub use range_planner::Granularity;
