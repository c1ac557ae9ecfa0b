//! Folds classified rows into per-article counts.

use tracing::{debug, warn};

use super::classifier::{download_label_article, Classification};
use crate::domain::{ArticleId, DownloadCounts, RawRow, ViewBreakdown, ViewCounts, ViewType};

/// Running page-view totals per article.
///
/// Several raw paths can map to the same (article, view type), so counts
/// are summed rather than replaced.
#[derive(Debug, Default, Clone)]
pub struct ViewTally {
    counts: ViewCounts,
}

impl ViewTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_single(&mut self, article: ArticleId, view: ViewType, count: u64) {
        self.counts
            .entry(article)
            .or_insert_with(ViewBreakdown::default)
            .add(view, count);
    }

    pub fn into_inner(self) -> ViewCounts {
        self.counts
    }
}

impl Extend<(ArticleId, ViewType, u64)> for ViewTally {
    fn extend<T: IntoIterator<Item = (ArticleId, ViewType, u64)>>(&mut self, iter: T) {
        for (article, view, count) in iter {
            self.add_single(article, view, count);
        }
    }
}

impl FromIterator<(ArticleId, ViewType, u64)> for ViewTally {
    fn from_iter<T: IntoIterator<Item = (ArticleId, ViewType, u64)>>(iter: T) -> Self {
        let mut tally = Self::new();
        tally.extend(iter);
        tally
    }
}

/// Group (article, view type, count) triples into per-article breakdowns.
pub fn aggregate_views<I>(pairs: I) -> ViewCounts
where
    I: IntoIterator<Item = (ArticleId, ViewType, u64)>,
{
    pairs.into_iter().collect::<ViewTally>().into_inner()
}

/// Collect (article, count) pairs. A repeated article keeps the last count
/// seen; the API already totals each label, so repeats are not summed.
pub fn aggregate_downloads<I>(pairs: I) -> DownloadCounts
where
    I: IntoIterator<Item = (ArticleId, u64)>,
{
    let mut counts = DownloadCounts::new();
    for (article, count) in pairs {
        if let Some(previous) = counts.insert(article.clone(), count) {
            debug!(
                "download count for {} replaced: {} -> {}",
                article, previous, count
            );
        }
    }
    counts
}

/// Classify raw view rows, dropping (and logging) anything unrecognized.
pub fn classify_view_rows<F>(rows: &[RawRow], classify: F) -> Vec<(ArticleId, ViewType, u64)>
where
    F: Fn(&str) -> Classification,
{
    rows.iter()
        .filter_map(|row| {
            let Some(count) = row.parsed_count() else {
                warn!("skipping row with unparsable count: {:?}", row);
                return None;
            };
            match classify(&row.dimension) {
                Classification::Classified { article, view } => Some((article, view, count)),
                Classification::Unrecognized { reason } => {
                    warn!("skipping unhandled path: {}", reason);
                    None
                }
            }
        })
        .collect()
}

/// Turn raw download rows into (article, count) pairs.
pub fn download_rows(rows: &[RawRow]) -> Vec<(ArticleId, u64)> {
    rows.iter()
        .filter_map(|row| match row.parsed_count() {
            Some(count) => Some((download_label_article(&row.dimension), count)),
            None => {
                warn!("skipping download row with unparsable count: {:?}", row);
                None
            }
        })
        .collect()
}
