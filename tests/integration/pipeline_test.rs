//! End-to-end runs against a temporary cache and a scripted analytics API.

use async_trait::async_trait;
use chrono::NaiveDate;
use elife_ga_metrics::application::{
    CachePolicy, MetricsContext, MetricsRequest, MetricsService, RetryPolicy,
};
use elife_ga_metrics::domain::{
    ymd, AnalyticsClient, AnalyticsError, AnalyticsQuery, ArticleId, DateUnit, MetricKind,
    MetricsError, ResponseStore,
};
use elife_ga_metrics::infrastructure::FileCache;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, TempDir};

/// Answers every query with a fixed set of rows and counts the calls.
/// The first `failures` calls are refused as rate limited.
struct FakeAnalytics {
    calls: AtomicUsize,
    failures: usize,
    seen: Mutex<Vec<(String, String)>>,
}

impl FakeAnalytics {
    fn new() -> Self {
        Self::failing(0)
    }

    fn failing(failures: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalyticsClient for FakeAnalytics {
    async fn execute(&self, query: &AnalyticsQuery) -> Result<Value, AnalyticsError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(AnalyticsError::RateLimited {
                reason: "rateLimitExceeded".into(),
            });
        }
        self.seen
            .lock()
            .unwrap()
            .push((query.dimensions.clone(), ymd(query.start_date)));
        let rows = if query.dimensions == "ga:eventLabel" {
            json!([
                ["10.7554/eLife.01234::pdf-article", "7"],
                ["10.7554/eLife.04321::pdf-figures", "2"],
            ])
        } else {
            json!([
                ["/content/3/e01234", "20"],
                ["/content/3/e01234.full", "5"],
                ["/content/3/e01234.abstract", "3"],
                ["/content/elife/3/e04321/abstract-2", "1"],
                ["/content/3/e01234.pdf", "99"],
            ])
        };
        Ok(json!({
            "kind": "analytics#gaData",
            "id": "https://www.googleapis.com/analytics/v3/data/ga?ids=ga:1",
            "selfLink": "https://www.googleapis.com/analytics/v3/data/ga?ids=ga:1",
            "profileInfo": {"profileId": "1"},
            "query": {
                "ids": query.ids,
                "start-date": ymd(query.start_date),
                "end-date": ymd(query.end_date),
                "filters": query.filters,
            },
            "rows": rows,
        }))
    }
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn setup(client: Option<Arc<FakeAnalytics>>) -> (TempDir, Arc<FileCache>, MetricsService) {
    let dir = tempdir().unwrap();
    let cache = Arc::new(FileCache::new(dir.path()).with_today(d(2016, 5, 10)));
    let service = MetricsService::new(MetricsContext {
        table_id: "ga:82618489".into(),
        client: client.map(|c| c as Arc<dyn AnalyticsClient>),
        store: cache.clone(),
        retry: RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
        },
    });
    (dir, cache, service)
}

fn seed(cache: &FileCache, kind: MetricKind, unit: DateUnit, rows: Value) {
    let path = cache.entry_path(kind, unit);
    cache.write(&path, json!({"query": {}, "rows": rows})).unwrap();
}

#[tokio::test]
async fn cached_days_need_no_network() {
    let fake = Arc::new(FakeAnalytics::new());
    let (_dir, cache, service) = setup(Some(fake.clone()));
    for day in [d(2015, 3, 1), d(2015, 3, 2)] {
        let unit = DateUnit::day(day);
        seed(&cache, MetricKind::Views, unit, json!([["/content/4/e05000", "2"]]));
        seed(&cache, MetricKind::Downloads, unit, json!([]));
    }

    let report = service
        .article_metrics(&MetricsRequest::daily(d(2015, 3, 1), d(2015, 3, 2), CachePolicy::CACHE_FIRST))
        .await
        .unwrap();

    assert_eq!(fake.calls(), 0);
    let json = serde_json::to_value(&report).unwrap();
    let labels: Vec<&String> = json.as_object().unwrap().keys().collect();
    assert_eq!(labels, vec!["2015-03-01", "2015-03-02"]);
    assert_eq!(json["2015-03-01"]["views"]["10.7554/eLife.05000"]["full"], 2);
}

#[tokio::test]
async fn fetched_responses_are_sanitized_cached_and_reused() {
    let fake = Arc::new(FakeAnalytics::new());
    let (_dir, cache, service) = setup(Some(fake.clone()));
    let request = MetricsRequest::daily(d(2015, 6, 1), d(2015, 6, 1), CachePolicy::CACHE_FIRST);

    let report = service.article_metrics(&request).await.unwrap();
    assert_eq!(fake.calls(), 2);

    let unit = DateUnit::day(d(2015, 6, 1));
    let metrics = &report[&unit];
    let e01234 = ArticleId::from_short("e01234");
    let views = metrics.views[&e01234];
    assert_eq!((views.full, views.abstract_views, views.digest), (25, 3, 0));
    assert_eq!(metrics.views[&ArticleId::from_short("e04321")].digest, 1);
    assert_eq!(metrics.downloads[&e01234], 7);

    let on_disk = cache
        .read(&cache.entry_path(MetricKind::Views, unit))
        .unwrap();
    for key in ["id", "selfLink", "profileInfo"] {
        assert!(on_disk.get(key).is_none(), "{} was cached", key);
    }
    assert!(on_disk["query"].get("ids").is_none());

    // second run is served from disk
    let again = service.article_metrics(&request).await.unwrap();
    assert_eq!(fake.calls(), 2);
    assert_eq!(again, report);
}

#[tokio::test]
async fn rate_limiting_is_ridden_out() {
    let fake = Arc::new(FakeAnalytics::failing(3));
    let (_dir, _cache, service) = setup(Some(fake.clone()));

    let report = service
        .article_metrics(&MetricsRequest::daily(d(2015, 6, 1), d(2015, 6, 1), CachePolicy::NO_CACHE))
        .await
        .unwrap();

    // three refusals then one success per kind
    assert_eq!(fake.calls(), 5);
    assert_eq!(report.len(), 1);
}

#[tokio::test]
async fn persistent_rate_limiting_aborts_the_run() {
    let fake = Arc::new(FakeAnalytics::failing(usize::MAX));
    let (_dir, _cache, service) = setup(Some(fake.clone()));

    let err = service
        .article_metrics(&MetricsRequest::daily(d(2015, 6, 1), d(2015, 6, 1), CachePolicy::NO_CACHE))
        .await
        .unwrap_err();
    assert!(matches!(err, MetricsError::RetriesExhausted { attempts: 5 }));
    assert_eq!(fake.calls(), 5);
}

#[tokio::test]
async fn monthly_units_respect_inception() {
    let fake = Arc::new(FakeAnalytics::new());
    let (_dir, _cache, service) = setup(Some(fake.clone()));

    let report = service
        .article_metrics(&MetricsRequest::monthly(d(2014, 12, 15), d(2015, 3, 3), CachePolicy::CACHE_FIRST))
        .await
        .unwrap();

    let labels: Vec<String> = report.keys().map(|u| u.label()).collect();
    assert_eq!(
        labels,
        vec![
            "2014-12-01_2014-12-31",
            "2015-01-01_2015-01-31",
            "2015-02-01_2015-02-28",
            "2015-03-01_2015-03-31",
        ]
    );
    // downloads began mid february: only march qualifies
    let download_months: Vec<String> = fake
        .seen
        .lock()
        .unwrap()
        .iter()
        .filter(|(dims, _)| dims == "ga:eventLabel")
        .map(|(_, start)| start.clone())
        .collect();
    assert_eq!(download_months, vec!["2015-03-01"]);
    assert!(report[&DateUnit::new(d(2015, 2, 1), d(2015, 2, 28))]
        .downloads
        .is_empty());
    assert_eq!(fake.calls(), 5);
}

#[tokio::test]
async fn offline_runs_serve_only_the_cache() {
    let (_dir, cache, service) = setup(None);
    let unit = DateUnit::day(d(2015, 6, 1));
    seed(&cache, MetricKind::Downloads, unit, json!([["10.7554/eLife.01234::x", "4"]]));

    let report = service
        .article_metrics(&MetricsRequest::daily(d(2015, 6, 1), d(2015, 6, 3), CachePolicy::CACHE_ONLY))
        .await
        .unwrap();
    assert_eq!(report.len(), 3);
    assert_eq!(report[&unit].downloads[&ArticleId::from_short("e01234")], 4);
    assert!(report[&unit].views.is_empty());

    let err = service
        .article_metrics(&MetricsRequest::daily(d(2015, 6, 1), d(2015, 6, 3), CachePolicy::CACHE_FIRST))
        .await
        .unwrap_err();
    assert!(matches!(err, MetricsError::OfflineFetch { .. }));
}
