//! URL grammars for the two generations of the journal website.
//!
//! The site changed its article URLs on [`SITE_SWITCH`]. Each generation
//! needs its own page-path filter when querying and its own classifier
//! when reading the rows back. Downloads are tracked by event label and
//! look the same on both.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use tracing::warn;

use super::aggregator::{aggregate_downloads, aggregate_views, classify_view_rows, download_rows};
use super::classifier::{classify_articles_path, classify_content_path, Classification};
use crate::domain::{
    AnalyticsQuery, DateUnit, DownloadCounts, MetricKind, RawRow, ViewCounts,
};

/// Last day served entirely by the original site.
pub const SITE_SWITCH: NaiveDate = match NaiveDate::from_ymd_opt(2016, 2, 9) {
    Some(d) => d,
    None => panic!("invalid site switch date"),
};

/// Suffixes a `/content/...` article path may carry.
const CONTENT_SUFFIXES: &str = r"(\.full|\.abstract|\.short|/abstract-[12])?";

pub const DOWNLOADS_FILTER: &str =
    "ga:eventAction==Download;ga:eventCategory==Article;ga:eventLabel=~pdf-article";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteVersion {
    V1,
    V2,
}

impl SiteVersion {
    pub fn grammar(&self) -> &'static dyn UrlGrammar {
        match self {
            SiteVersion::V1 => &ContentGrammar,
            SiteVersion::V2 => &ArticlesGrammar,
        }
    }
}

impl fmt::Display for SiteVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteVersion::V1 => f.write_str("v1"),
            SiteVersion::V2 => f.write_str("v2"),
        }
    }
}

/// Pick the site version whose URLs a unit's traffic was recorded under.
///
/// A unit that straddles the switch gets the newer grammar; traffic from
/// the days before the switch is lost for that unit.
pub fn grammar_for(unit: DateUnit) -> SiteVersion {
    if unit.end() <= SITE_SWITCH {
        SiteVersion::V1
    } else if unit.start() > SITE_SWITCH {
        SiteVersion::V2
    } else {
        warn!(
            "{} straddles the site switch on {}, using {} urls: results are only partially accurate",
            unit,
            SITE_SWITCH,
            SiteVersion::V2
        );
        SiteVersion::V2
    }
}

pub fn views_query(table_id: &str, unit: DateUnit, filters: String) -> AnalyticsQuery {
    AnalyticsQuery {
        metrics: "ga:pageviews".into(),
        dimensions: "ga:pagePath".into(),
        sort: "-ga:pageviews".into(),
        filters,
        ..AnalyticsQuery::new(table_id, unit)
    }
}

pub fn downloads_query(table_id: &str, unit: DateUnit) -> AnalyticsQuery {
    AnalyticsQuery {
        metrics: "ga:totalEvents".into(),
        dimensions: "ga:eventLabel".into(),
        sort: "-ga:totalEvents".into(),
        filters: DOWNLOADS_FILTER.into(),
        ..AnalyticsQuery::new(table_id, unit)
    }
}

/// How one site generation is queried and read back.
pub trait UrlGrammar: Send + Sync {
    /// `filters` parameter selecting article page views.
    fn views_filter(&self) -> String;

    fn classify(&self, path: &str) -> Classification;

    fn build_query(&self, kind: MetricKind, table_id: &str, unit: DateUnit) -> AnalyticsQuery {
        match kind {
            MetricKind::Views => views_query(table_id, unit, self.views_filter()),
            MetricKind::Downloads => downloads_query(table_id, unit),
        }
    }

    fn parse_view_rows(&self, rows: &[RawRow]) -> ViewCounts {
        aggregate_views(classify_view_rows(rows, |path| self.classify(path)))
    }

    fn parse_download_rows(&self, rows: &[RawRow]) -> DownloadCounts {
        aggregate_downloads(download_rows(rows))
    }
}

/// `/content/<volume>/eNNNNN` paths plus early (POA) paths.
pub struct ContentGrammar;

impl UrlGrammar for ContentGrammar {
    fn views_filter(&self) -> String {
        // ',' ORs the two shapes together
        [
            format!(
                r"ga:pagePath=~^/content/(elife/)?[0-9]+/e[0-9]{{5}}{}$",
                CONTENT_SUFFIXES
            ),
            format!(
                r"ga:pagePath=~^/content/(elife/)?early/[0-9/]{{11}}10\.7554/elife\.[0-9]{{5}}{}$",
                CONTENT_SUFFIXES
            ),
        ]
        .join(",")
    }

    fn classify(&self, path: &str) -> Classification {
        classify_content_path(path)
    }
}

/// `/articles/NNNNN` paths.
pub struct ArticlesGrammar;

impl UrlGrammar for ArticlesGrammar {
    fn views_filter(&self) -> String {
        r"ga:pagePath=~^/articles/[0-9]{5}(/abstract|/digest)?$".to_string()
    }

    fn classify(&self, path: &str) -> Classification {
        classify_articles_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analytics::MAX_FILTER_REGEX_LEN;
    use crate::domain::{ArticleId, ResponseOrigin};
    use chrono::Duration;
    use regex::RegexBuilder;
    use serde_json::json;

    fn month(y: i32, m: u32, last: u32) -> DateUnit {
        DateUnit::new(
            NaiveDate::from_ymd_opt(y, m, 1).unwrap(),
            NaiveDate::from_ymd_opt(y, m, last).unwrap(),
        )
    }

    #[test]
    fn test_grammar_for_daily() {
        let d1 = Duration::days(1);
        assert_eq!(grammar_for(DateUnit::day(SITE_SWITCH)), SiteVersion::V1);
        assert_eq!(grammar_for(DateUnit::day(SITE_SWITCH - d1)), SiteVersion::V1);
        assert_eq!(grammar_for(DateUnit::day(SITE_SWITCH + d1)), SiteVersion::V2);
    }

    #[test]
    fn test_grammar_for_monthly() {
        assert_eq!(grammar_for(month(2016, 1, 31)), SiteVersion::V1);
        // february straddles the switch: newer grammar wins
        assert_eq!(grammar_for(month(2016, 2, 29)), SiteVersion::V2);
        assert_eq!(grammar_for(month(2016, 3, 31)), SiteVersion::V2);
    }

    #[test]
    fn test_build_query() {
        let unit = month(2015, 6, 30);
        let q = SiteVersion::V1
            .grammar()
            .build_query(MetricKind::Views, "ga:1", unit);
        assert_eq!(q.metrics, "ga:pageviews");
        assert_eq!(q.dimensions, "ga:pagePath");
        assert_eq!(q.sort, "-ga:pageviews");
        assert_eq!(q.max_results, 10_000);
        assert_eq!(q.unit(), unit);
        assert!(q.validate().is_ok());

        let q = SiteVersion::V2
            .grammar()
            .build_query(MetricKind::Downloads, "ga:1", unit);
        assert_eq!(q.filters, DOWNLOADS_FILTER);
        assert_eq!(q.dimensions, "ga:eventLabel");
    }

    #[test]
    fn test_views_filters_never_look_like_downloads() {
        // the cache path of a response is derived from its filters
        for version in [SiteVersion::V1, SiteVersion::V2] {
            let q = version
                .grammar()
                .build_query(MetricKind::Views, "ga:1", month(2015, 6, 30));
            let response = json!({"query": {"start-date": "2015-06-01", "end-date": "2015-06-30", "filters": q.filters}});
            assert_eq!(
                ResponseOrigin::from_response(&response).unwrap().kind,
                MetricKind::Views
            );
        }
    }

    #[test]
    fn test_v1_filter_matches_what_classifier_accepts() {
        let filter = ContentGrammar.views_filter();
        let patterns: Vec<_> = filter
            .split(',')
            .map(|p| {
                RegexBuilder::new(p.trim_start_matches("ga:pagePath=~"))
                    .case_insensitive(true)
                    .build()
                    .unwrap()
            })
            .collect();
        for path in [
            "/content/4/e05123",
            "/content/4/e05123.full",
            "/content/elife/4/e05123/abstract-2",
            "/content/early/2015/01/02/10.7554/eLife.05123.short",
        ] {
            assert!(patterns.iter().any(|re| re.is_match(path)), "{}", path);
            assert!(matches!(
                ContentGrammar.classify(path),
                Classification::Classified { .. }
            ));
        }
        assert!(!patterns.iter().any(|re| re.is_match("/content/4/e05123.pdf")));
    }

    #[test]
    fn test_filter_expressions_fit_the_api_limit() {
        for version in [SiteVersion::V1, SiteVersion::V2] {
            for part in version.grammar().views_filter().split(',') {
                let expr = part.trim_start_matches("ga:pagePath=~");
                assert!(
                    expr.len() <= MAX_FILTER_REGEX_LEN,
                    "{} filter is {} chars: {}",
                    version,
                    expr.len(),
                    expr
                );
            }
        }
        let label_expr = DOWNLOADS_FILTER.rsplit("=~").next().unwrap();
        assert!(label_expr.len() <= MAX_FILTER_REGEX_LEN);
    }

    #[test]
    fn test_parse_rows() {
        let rows = vec![
            RawRow::new("/articles/05123", "7"),
            RawRow::new("/articles/05123/digest", "1"),
            RawRow::new("/content/4/e05123", "100"),
        ];
        let views = ArticlesGrammar.parse_view_rows(&rows);
        let b = views[&ArticleId::from_short("e05123")];
        assert_eq!((b.full, b.abstract_views, b.digest), (7, 0, 1));

        let views = ContentGrammar.parse_view_rows(&rows);
        assert_eq!(views[&ArticleId::from_short("e05123")].full, 100);
    }
}
