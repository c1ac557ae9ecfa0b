//! Decides whether a query unit is served from disk or the network.

use std::path::PathBuf;
use tracing::{debug, info};

use crate::domain::{
    response_filters, AnalyticsQuery, CacheError, DateUnit, EntryState, MetricKind, ResponseStore,
};

/// Caller's cache preferences for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Serve complete cache entries instead of re-querying.
    pub use_cached: bool,
    /// Never touch the network; missing units come back empty.
    pub use_only_cached: bool,
}

impl CachePolicy {
    pub const CACHE_FIRST: CachePolicy = CachePolicy {
        use_cached: true,
        use_only_cached: false,
    };

    pub const CACHE_ONLY: CachePolicy = CachePolicy {
        use_cached: true,
        use_only_cached: true,
    };

    pub const NO_CACHE: CachePolicy = CachePolicy {
        use_cached: false,
        use_only_cached: false,
    };
}

/// Where a unit's data will come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachePlan {
    /// A complete entry exists at this path.
    Cached(PathBuf),
    /// Query the network; the response belongs at this path.
    NeedsFetch(PathBuf),
    /// Cache-only run with nothing usable on disk.
    Miss,
}

/// Plan one (kind, unit).
///
/// Only final entries are ever served: a `.partial` file is by definition
/// incomplete, and one left over from a window that has since closed is
/// superseded by a fresh query.
pub fn plan(
    store: &dyn ResponseStore,
    unit: DateUnit,
    kind: MetricKind,
    policy: CachePolicy,
) -> CachePlan {
    let state = store.entry_state(kind, unit);

    if policy.use_cached {
        if let EntryState::Final(path) = &state {
            debug!("we have {} results for {} already", kind, unit);
            return CachePlan::Cached(path.clone());
        }
    }

    match &state {
        EntryState::StalePartial(path) => {
            info!(
                "partial {} results at {} are out of date, final results needed",
                kind,
                path.display()
            );
        }
        EntryState::Partial(path) => {
            debug!("ignoring incomplete {} results at {}", kind, path.display());
        }
        EntryState::Absent => debug!("no cache file for {} results for {}", kind, unit),
        EntryState::Final(_) => {}
    }

    if policy.use_only_cached {
        info!("cache-only run, no {} results for {}", kind, unit);
        return CachePlan::Miss;
    }
    CachePlan::NeedsFetch(store.entry_path(kind, unit))
}

/// Plan one (kind, unit) for a concrete query.
///
/// On top of [`plan`], a cached entry is only served if it was gathered
/// with the same `filters` as `query`. Both site generations share one
/// cache path per unit, so a views entry fetched with the other
/// generation's URL filter is treated as missing. Entries that don't
/// record their filters are trusted.
pub fn plan_query(
    store: &dyn ResponseStore,
    query: &AnalyticsQuery,
    kind: MetricKind,
    policy: CachePolicy,
) -> Result<CachePlan, CacheError> {
    let unit = query.unit();
    let path = match plan(store, unit, kind, policy) {
        CachePlan::Cached(path) => path,
        other => return Ok(other),
    };

    let cached = store.read(&path)?;
    match response_filters(&cached) {
        Some(filters) if filters != query.filters => {
            info!(
                "cached {} results for {} were gathered with different filters, final results needed",
                kind, unit
            );
            debug!("cached filters {:?}, wanted {:?}", filters, query.filters);
            if policy.use_only_cached {
                Ok(CachePlan::Miss)
            } else {
                Ok(CachePlan::NeedsFetch(store.entry_path(kind, unit)))
            }
        }
        _ => Ok(CachePlan::Cached(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::grammar::SiteVersion;
    use crate::infrastructure::FileCache;
    use chrono::NaiveDate;
    use serde_json::json;
    use tempfile::tempdir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn today() -> NaiveDate {
        d(2016, 5, 10)
    }

    #[test]
    fn test_final_entry_is_cached() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path()).with_today(today());
        let unit = DateUnit::day(d(2016, 5, 1));
        let path = cache.entry_path(MetricKind::Views, unit);
        cache.write(&path, json!({"rows": []})).unwrap();

        assert_eq!(
            plan(&cache, unit, MetricKind::Views, CachePolicy::CACHE_FIRST),
            CachePlan::Cached(path.clone())
        );
        // the other kind is still missing
        assert!(matches!(
            plan(&cache, unit, MetricKind::Downloads, CachePolicy::CACHE_FIRST),
            CachePlan::NeedsFetch(_)
        ));
        // caching disabled: refetch regardless
        assert_eq!(
            plan(&cache, unit, MetricKind::Views, CachePolicy::NO_CACHE),
            CachePlan::NeedsFetch(path)
        );
    }

    #[test]
    fn test_cache_only_miss() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path()).with_today(today());
        let unit = DateUnit::day(d(2016, 5, 1));
        assert_eq!(
            plan(&cache, unit, MetricKind::Views, CachePolicy::CACHE_ONLY),
            CachePlan::Miss
        );
    }

    #[test]
    fn test_partial_entry_is_never_served() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path()).with_today(today());
        let unit = DateUnit::day(today());
        let path = cache.entry_path(MetricKind::Views, unit);
        assert!(path.to_string_lossy().ends_with(".partial"));
        cache.write(&path, json!({"rows": []})).unwrap();

        assert_eq!(
            plan(&cache, unit, MetricKind::Views, CachePolicy::CACHE_FIRST),
            CachePlan::NeedsFetch(path)
        );
        assert_eq!(
            plan(&cache, unit, MetricKind::Views, CachePolicy::CACHE_ONLY),
            CachePlan::Miss
        );
    }

    #[test]
    fn test_stale_partial_is_refetched_as_final() {
        let dir = tempdir().unwrap();
        let unit = DateUnit::day(d(2016, 5, 9));

        // written on the day itself
        let then = FileCache::new(dir.path()).with_today(d(2016, 5, 9));
        let partial = then.entry_path(MetricKind::Views, unit);
        then.write(&partial, json!({"rows": []})).unwrap();

        // a day later the window has closed
        let now = FileCache::new(dir.path()).with_today(today());
        assert_eq!(
            now.entry_state(MetricKind::Views, unit),
            EntryState::StalePartial(partial)
        );
        let expected = now.entry_path(MetricKind::Views, unit);
        assert!(!expected.to_string_lossy().ends_with(".partial"));
        assert_eq!(
            plan(&now, unit, MetricKind::Views, CachePolicy::CACHE_FIRST),
            CachePlan::NeedsFetch(expected)
        );
    }

    #[test]
    fn test_entry_from_other_site_generation_is_not_served() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path()).with_today(today());
        let unit = DateUnit::day(d(2016, 3, 1));
        let legacy = SiteVersion::V1
            .grammar()
            .build_query(MetricKind::Views, "ga:1", unit);
        let current = SiteVersion::V2
            .grammar()
            .build_query(MetricKind::Views, "ga:1", unit);
        let path = cache.entry_path(MetricKind::Views, unit);
        cache
            .write(&path, json!({"query": {"filters": legacy.filters}, "rows": []}))
            .unwrap();

        assert_eq!(
            plan_query(&cache, &legacy, MetricKind::Views, CachePolicy::CACHE_FIRST).unwrap(),
            CachePlan::Cached(path.clone())
        );
        assert_eq!(
            plan_query(&cache, &current, MetricKind::Views, CachePolicy::CACHE_FIRST).unwrap(),
            CachePlan::NeedsFetch(path)
        );
        assert_eq!(
            plan_query(&cache, &current, MetricKind::Views, CachePolicy::CACHE_ONLY).unwrap(),
            CachePlan::Miss
        );
    }

    #[test]
    fn test_entry_without_recorded_filters_is_trusted() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path()).with_today(today());
        let unit = DateUnit::day(d(2016, 3, 1));
        let query = SiteVersion::V2
            .grammar()
            .build_query(MetricKind::Views, "ga:1", unit);
        let path = cache.entry_path(MetricKind::Views, unit);
        cache.write(&path, json!({"query": {}, "rows": []})).unwrap();

        assert_eq!(
            plan_query(&cache, &query, MetricKind::Views, CachePolicy::CACHE_FIRST).unwrap(),
            CachePlan::Cached(path)
        );
    }
}
