//! Turns raw analytics dimensions into article ids.
//!
//! Page paths recorded by analytics come in several shapes depending on
//! the site version and on whether the article was published early (POA).
//! Anything we can't place is reported as [`Classification::Unrecognized`]
//! so the caller can drop the row and carry on; analytics data is noisy.

use regex::Regex;
use std::sync::LazyLock;

use crate::domain::{ArticleId, ViewType};

/// Delimiter between the DOI and the free text in a download event label.
pub const EVENT_LABEL_DELIMITER: &str = "::";

/// `/content/early/2015/01/02/10.7554/eLife.05123` and the `/content/elife/early/...` variant.
static POA_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/content/(?:elife/)?early/\d{4}/\d{2}/\d{2}/10\.7554/elife\.(\d{5})([./].*)?$")
        .expect("valid POA path regex")
});

/// `/content/<volume>/e01234` and the legacy `/content/elife/<volume>/e01234`.
static CONTENT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/content/(?:elife/)?[^/]+/e(\d{5})([./].*)?$").expect("valid content path regex")
});

/// `/articles/01234`, `/articles/01234/abstract`, `/articles/01234/digest`.
static ARTICLES_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/articles/(\d{5})(/.*)?$").expect("valid articles path regex")
});

/// Outcome of classifying one page path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Classified { article: ArticleId, view: ViewType },
    Unrecognized { reason: String },
}

impl Classification {
    fn unrecognized(reason: impl Into<String>) -> Self {
        Classification::Unrecognized {
            reason: reason.into(),
        }
    }
}

/// Suffix grammar of the `/content/...` paths.
fn content_view_type(suffix: &str) -> Option<ViewType> {
    match suffix {
        "" | ".full" => Some(ViewType::Full),
        ".abstract" | ".short" | "/abstract-1" => Some(ViewType::Abstract),
        "/abstract-2" => Some(ViewType::Digest),
        _ => None,
    }
}

fn articles_view_type(suffix: &str) -> Option<ViewType> {
    match suffix {
        "" => Some(ViewType::Full),
        "/abstract" => Some(ViewType::Abstract),
        "/digest" => Some(ViewType::Digest),
        _ => None,
    }
}

fn from_captures(
    caps: regex::Captures<'_>,
    path: &str,
    grammar: fn(&str) -> Option<ViewType>,
) -> Classification {
    let digits = &caps[1];
    let suffix = caps.get(2).map_or("", |m| m.as_str());
    match grammar(suffix) {
        Some(view) => Classification::Classified {
            article: ArticleId::from_short(format!("e{}", digits)),
            view,
        },
        None => Classification::unrecognized(format!("unknown suffix {:?} in {:?}", suffix, path)),
    }
}

/// Classify a path recorded by the original (pre-switch) site.
///
/// The site isn't case sensitive, so neither are we.
pub fn classify_content_path(path: &str) -> Classification {
    let lower = path.to_lowercase();

    // most specific shape first: POA paths also start with /content/
    if let Some(caps) = POA_PATH.captures(&lower) {
        return from_captures(caps, path, content_view_type);
    }
    if let Some(caps) = CONTENT_PATH.captures(&lower) {
        return from_captures(caps, path, content_view_type);
    }
    Classification::unrecognized(format!("unhandled path {:?}", path))
}

/// Classify a path recorded by the post-switch site.
pub fn classify_articles_path(path: &str) -> Classification {
    let lower = path.to_lowercase();
    match ARTICLES_PATH.captures(&lower) {
        Some(caps) => from_captures(caps, path, articles_view_type),
        None => Classification::unrecognized(format!("unhandled path {:?}", path)),
    }
}

/// Article named by a download event label such as
/// `10.7554/eLife.01234::pdf-article::Some title`.
///
/// Only the part before the first delimiter matters.
pub fn download_label_article(label: &str) -> ArticleId {
    let doi = label
        .split_once(EVENT_LABEL_DELIMITER)
        .map_or(label, |(doi, _)| doi);
    ArticleId::from_doi(doi)
}
