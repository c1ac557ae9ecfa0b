use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::article::{ArticleId, ViewBreakdown};
use super::dates::DateUnit;

pub type ViewCounts = BTreeMap<ArticleId, ViewBreakdown>;
pub type DownloadCounts = BTreeMap<ArticleId, u64>;

/// Views and downloads for one query unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnitMetrics {
    pub views: ViewCounts,
    pub downloads: DownloadCounts,
}

impl UnitMetrics {
    /// Articles that were downloaded but never viewed.
    pub fn downloads_without_views(&self) -> BTreeSet<&ArticleId> {
        self.downloads
            .keys()
            .filter(|id| !self.views.contains_key(*id))
            .collect()
    }
}

/// Result of one run, keyed by query unit.
pub type MetricsReport = BTreeMap<DateUnit, UnitMetrics>;
