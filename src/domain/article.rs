//! Article identifiers and the per-article view/download shapes.
//!
//! Articles are known internally by their short "deplumpened" id
//! (`e01234`) and externally by their DOI (`10.7554/eLife.01234`).

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

/// DOI prefix shared by every eLife article.
pub const DOI_PREFIX: &str = "10.7554/eLife.";

static SHORT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^e(\d+)$").expect("valid short id regex"));

static DOI_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^10\.7554/(?i:elife)\.(\d+)$").expect("valid doi regex"));

/// Convert a short article id (`e01234`) into its DOI (`10.7554/eLife.01234`).
///
/// Input that is not a short id is returned unchanged.
pub fn enplumpen(artid: &str) -> String {
    match SHORT_ID.captures(artid) {
        Some(caps) => format!("{}{}", DOI_PREFIX, &caps[1]),
        None => artid.to_string(),
    }
}

/// Convert a DOI (`10.7554/eLife.01234`) into its short id (`e01234`).
///
/// Input that doesn't look like an eLife DOI is logged and echoed back.
pub fn deplumpen(doi: &str) -> String {
    match DOI_ID.captures(doi) {
        Some(caps) => format!("e{}", &caps[1]),
        None => {
            warn!("cannot deplumpen {:?}: not an eLife DOI, using it as-is", doi);
            doi.to_string()
        }
    }
}

/// Canonical article identifier, stored in short form.
///
/// Serializes as the DOI so downstream reports stay in the external form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArticleId(String);

impl ArticleId {
    /// Build from a short id such as `e01234`.
    pub fn from_short(short: impl Into<String>) -> Self {
        Self(short.into())
    }

    /// Build from a DOI, falling back to the raw text when it isn't one.
    pub fn from_doi(doi: &str) -> Self {
        Self(deplumpen(doi))
    }

    /// Short (internal) form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// DOI (external) form.
    pub fn doi(&self) -> String {
        enplumpen(&self.0)
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.doi())
    }
}

impl Serialize for ArticleId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The two families of usage metric collected from analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Views,
    Downloads,
}

impl MetricKind {
    pub const ALL: [MetricKind; 2] = [MetricKind::Views, MetricKind::Downloads];

    /// Directory name used in the cache layout.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Views => "views",
            MetricKind::Downloads => "downloads",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rendition of an article a page view landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
    Full,
    Abstract,
    Digest,
}

/// Page view counts for one article over one query unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ViewBreakdown {
    pub full: u64,
    #[serde(rename = "abstract")]
    pub abstract_views: u64,
    pub digest: u64,
}

impl ViewBreakdown {
    pub fn add(&mut self, view: ViewType, count: u64) {
        match view {
            ViewType::Full => self.full += count,
            ViewType::Abstract => self.abstract_views += count,
            ViewType::Digest => self.digest += count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enplumpen() {
        assert_eq!(enplumpen("e01234"), "10.7554/eLife.01234");
    }

    #[test]
    fn test_deplumpen_inverts_enplumpen() {
        assert_eq!(deplumpen(&enplumpen("e01234")), "e01234");
        assert_eq!(deplumpen("10.7554/eLife.09560"), "e09560");
    }

    #[test]
    fn test_deplumpen_ignores_journal_case() {
        // event labels are not consistently cased
        assert_eq!(deplumpen("10.7554/elife.01234"), "e01234");
        assert_eq!(deplumpen("10.7554/ELIFE.01234"), "e01234");
        assert_eq!(
            ArticleId::from_doi("10.7554/elife.01234"),
            ArticleId::from_short("e01234")
        );
        // the prefix itself must still be ours
        assert_eq!(deplumpen("10.7555/eLife.01234"), "10.7555/eLife.01234");
    }

    #[test]
    fn test_deplumpen_echoes_garbage() {
        assert_eq!(deplumpen("not-a-doi"), "not-a-doi");
        // other publishers' DOIs are not ours to shorten
        assert_eq!(deplumpen("10.1038/nature12373"), "10.1038/nature12373");
    }

    #[test]
    fn test_enplumpen_leaves_non_short_ids_alone() {
        assert_eq!(enplumpen("10.7554/eLife.01234"), "10.7554/eLife.01234");
        assert_eq!(enplumpen("elephant"), "elephant");
    }

    #[test]
    fn test_article_id_forms() {
        let id = ArticleId::from_doi("10.7554/eLife.05123");
        assert_eq!(id.as_str(), "e05123");
        assert_eq!(id.doi(), "10.7554/eLife.05123");
        assert_eq!(id, ArticleId::from_short("e05123"));
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            "\"10.7554/eLife.05123\""
        );
    }

    #[test]
    fn test_breakdown_serializes_three_keys() {
        let mut b = ViewBreakdown::default();
        b.add(ViewType::Full, 5);
        b.add(ViewType::Abstract, 1);
        let json = serde_json::to_value(b).unwrap();
        assert_eq!(json, serde_json::json!({"full": 5, "abstract": 1, "digest": 0}));
    }
}
