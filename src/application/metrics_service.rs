//! Top-level driver: plan units, fill cache gaps, then read everything back.
//!
//! Each (kind, unit) moves through `Planned -> CacheHit | Fetching ->
//! Fetched | SkippedMiss`. After the fetch phase every surviving unit is
//! read from disk, so fresh and cached data go through the same parsing.

use chrono::{Datelike, Days, NaiveDate};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cache_gate::{self, CachePlan, CachePolicy};
use super::grammar::{grammar_for, SiteVersion};
use super::query_executor::{QueryExecutor, RetryPolicy};
use super::range_planner::{self, Granularity};
use crate::domain::{
    response_rows, AnalyticsClient, AnalyticsQuery, DateUnit, MetricKind, MetricsError,
    MetricsReport, ResponseStore, UnitMetrics, DOWNLOADS_INCEPTION, VIEWS_INCEPTION,
};

/// Days covered by a refresh, today included.
pub const REFRESH_DAYS: u64 = 7;

/// Everything a run needs, built once at startup and passed in.
pub struct MetricsContext {
    /// Analytics profile, `ga:NNNNNNNN`.
    pub table_id: String,
    /// `None` when no credentials were found; only cache-only runs work then.
    pub client: Option<Arc<dyn AnalyticsClient>>,
    pub store: Arc<dyn ResponseStore>,
    pub retry: RetryPolicy,
}

/// Which URL grammar to read page views with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteSelection {
    /// Always the original `/content/...` grammar.
    Legacy,
    /// Per unit, by comparing its dates against the site switch.
    ByDate,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricsRequest {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub granularity: Granularity,
    pub policy: CachePolicy,
    pub site: SiteSelection,
}

impl MetricsRequest {
    pub fn daily(from: NaiveDate, to: NaiveDate, policy: CachePolicy) -> Self {
        Self {
            from,
            to,
            granularity: Granularity::Daily,
            policy,
            site: SiteSelection::Legacy,
        }
    }

    pub fn monthly(from: NaiveDate, to: NaiveDate, policy: CachePolicy) -> Self {
        Self {
            granularity: Granularity::Monthly,
            ..Self::daily(from, to, policy)
        }
    }

    pub fn site_aware(self) -> Self {
        Self {
            site: SiteSelection::ByDate,
            ..self
        }
    }

    /// The last week day by day plus the current month, cache first.
    /// Without a client nothing can be fetched, so only the cache is read.
    pub fn refresh(today: NaiveDate, online: bool) -> Vec<Self> {
        let policy = if online {
            CachePolicy::CACHE_FIRST
        } else {
            CachePolicy::CACHE_ONLY
        };
        let week_start = today
            .checked_sub_days(Days::new(REFRESH_DAYS - 1))
            .unwrap_or(today);
        let month_start = today.with_day(1).unwrap_or(today);
        vec![
            Self::daily(week_start, today, policy).site_aware(),
            Self::monthly(month_start, today, policy).site_aware(),
        ]
    }

    /// Every day and month since the earliest inception, ignoring the cache.
    pub fn regenerate(today: NaiveDate) -> Vec<Self> {
        let earliest = VIEWS_INCEPTION.min(DOWNLOADS_INCEPTION);
        vec![
            Self::daily(earliest, today, CachePolicy::NO_CACHE).site_aware(),
            Self::monthly(earliest, today, CachePolicy::NO_CACHE).site_aware(),
        ]
    }
}

/// Terminal state of one (kind, unit).
#[derive(Debug, Clone, PartialEq, Eq)]
enum UnitOutcome {
    CacheHit(PathBuf),
    Fetched(PathBuf),
    SkippedMiss,
}

impl UnitOutcome {
    fn path(&self) -> Option<&PathBuf> {
        match self {
            UnitOutcome::CacheHit(path) | UnitOutcome::Fetched(path) => Some(path),
            UnitOutcome::SkippedMiss => None,
        }
    }
}

pub struct MetricsService {
    ctx: MetricsContext,
    executor: Option<QueryExecutor>,
}

impl MetricsService {
    pub fn new(ctx: MetricsContext) -> Self {
        let executor = ctx
            .client
            .clone()
            .map(|client| QueryExecutor::new(client, ctx.store.clone(), ctx.retry));
        Self { ctx, executor }
    }

    pub fn is_online(&self) -> bool {
        self.executor.is_some()
    }

    /// Views and downloads per article for every unit in the requested range.
    ///
    /// Units before a kind's inception contribute nothing for that kind;
    /// units valid for neither kind are left out of the report.
    ///
    /// # Errors
    ///
    /// Any fetch or cache failure aborts the run; there is no partial result.
    pub async fn article_metrics(
        &self,
        request: &MetricsRequest,
    ) -> Result<MetricsReport, MetricsError> {
        let units = range_planner::units(request.granularity, request.from, request.to);
        info!(
            "{} {:?} units between {} and {}",
            units.len(),
            request.granularity,
            request.from,
            request.to
        );

        let versions: BTreeMap<DateUnit, SiteVersion> = units
            .iter()
            .map(|unit| {
                let version = match request.site {
                    SiteSelection::Legacy => SiteVersion::V1,
                    SiteSelection::ByDate => grammar_for(*unit),
                };
                (*unit, version)
            })
            .collect();

        let mut outcomes: BTreeMap<(MetricKind, DateUnit), UnitOutcome> = BTreeMap::new();
        let mut to_fetch: Vec<(MetricKind, AnalyticsQuery, PathBuf)> = Vec::new();

        for kind in MetricKind::ALL {
            for unit in range_planner::valid_units(&units, kind) {
                let version = versions.get(&unit).copied().unwrap_or(SiteVersion::V1);
                let query = version
                    .grammar()
                    .build_query(kind, &self.ctx.table_id, unit);
                match cache_gate::plan_query(self.ctx.store.as_ref(), &query, kind, request.policy)? {
                    CachePlan::Cached(path) => {
                        outcomes.insert((kind, unit), UnitOutcome::CacheHit(path));
                    }
                    CachePlan::Miss => {
                        outcomes.insert((kind, unit), UnitOutcome::SkippedMiss);
                    }
                    CachePlan::NeedsFetch(path) => to_fetch.push((kind, query, path)),
                }
            }
        }

        if !to_fetch.is_empty() {
            info!("{} queries to run", to_fetch.len());
        }
        for (kind, query, path) in to_fetch {
            let unit = query.unit();
            let executor = self
                .executor
                .as_ref()
                .ok_or(MetricsError::OfflineFetch { unit })?;
            debug!("fetching {} for {} with filters {}", kind, unit, query.filters);
            executor.execute(&query, &path).await?;
            outcomes.insert((kind, unit), UnitOutcome::Fetched(path));
        }

        let mut report = MetricsReport::new();
        for unit in &units {
            let grammar = versions
                .get(unit)
                .copied()
                .unwrap_or(SiteVersion::V1)
                .grammar();
            let mut metrics = UnitMetrics::default();
            let mut seen = false;

            for kind in MetricKind::ALL {
                let Some(outcome) = outcomes.get(&(kind, *unit)) else {
                    continue;
                };
                seen = true;
                let Some(path) = outcome.path() else {
                    continue;
                };
                let raw = self.ctx.store.read(path)?;
                let rows = response_rows(&raw);
                match kind {
                    MetricKind::Views => metrics.views = grammar.parse_view_rows(&rows),
                    MetricKind::Downloads => {
                        metrics.downloads = grammar.parse_download_rows(&rows)
                    }
                }
            }

            if !seen {
                continue;
            }
            let missing = metrics.downloads_without_views();
            if !missing.is_empty() {
                let detail: Vec<String> = missing
                    .iter()
                    .map(|id| format!("{}={}", id, metrics.downloads[*id]))
                    .collect();
                warn!(
                    "{}: downloads with no corresponding page view: {}",
                    unit,
                    detail.join(", ")
                );
            }
            report.insert(*unit, metrics);
        }

        Ok(report)
    }
}
