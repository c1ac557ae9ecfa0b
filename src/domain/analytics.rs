//! Analytics query construction and raw response handling.
//!
//! Queries follow the Core Reporting API v3 parameter set. Responses are
//! kept as raw JSON so they can be cached verbatim (minus identifiers).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::article::MetricKind;
use super::dates::{parse_ymd, ymd, DateUnit};
use super::error::{AnalyticsError, MetricsError};

/// The most rows the API will ever return for one query.
pub const MAX_RESULTS: u32 = 10_000;

/// Longest regular expression the API accepts in a filter.
pub const MAX_FILTER_REGEX_LEN: usize = 128;

/// Dimension that only download queries filter on.
pub const EVENT_LABEL_DIMENSION: &str = "ga:eventLabel";

/// Top-level keys removed from every response before it touches disk.
pub const SENSITIVE_KEYS: [&str; 3] = ["profileInfo", "id", "selfLink"];

/// One Core Reporting API query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsQuery {
    pub ids: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub metrics: String,
    pub dimensions: String,
    pub sort: String,
    pub filters: String,
    pub max_results: u32,
}

impl AnalyticsQuery {
    pub fn new(table_id: &str, unit: DateUnit) -> Self {
        Self {
            ids: table_id.to_string(),
            start_date: unit.start(),
            end_date: unit.end(),
            metrics: String::new(),
            dimensions: String::new(),
            sort: String::new(),
            filters: String::new(),
            max_results: MAX_RESULTS,
        }
    }

    pub fn unit(&self) -> DateUnit {
        DateUnit::new(self.start_date, self.end_date)
    }

    /// Reject queries the API would refuse before spending a request on them.
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.ids.trim().is_empty() {
            return Err(AnalyticsError::MalformedQuery("table id is empty".into()));
        }
        if self.start_date > self.end_date {
            return Err(AnalyticsError::MalformedQuery(format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }
        if self.metrics.is_empty() || self.dimensions.is_empty() {
            return Err(AnalyticsError::MalformedQuery(
                "metrics and dimensions are required".into(),
            ));
        }
        if self.max_results == 0 || self.max_results > MAX_RESULTS {
            return Err(AnalyticsError::MalformedQuery(format!(
                "max-results must be within 1..={}, got {}",
                MAX_RESULTS, self.max_results
            )));
        }
        // ',' is OR and ';' is AND between filter clauses
        for clause in self.filters.split([',', ';']) {
            if let Some((_, expr)) = clause.split_once("=~") {
                if expr.len() > MAX_FILTER_REGEX_LEN {
                    return Err(AnalyticsError::MalformedQuery(format!(
                        "filter expression is {} chars, the limit is {}: {}",
                        expr.len(),
                        MAX_FILTER_REGEX_LEN,
                        expr
                    )));
                }
            }
        }
        Ok(())
    }

    /// Query-string pairs in the API's own parameter names.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ids", self.ids.clone()),
            ("start-date", ymd(self.start_date)),
            ("end-date", ymd(self.end_date)),
            ("metrics", self.metrics.clone()),
            ("dimensions", self.dimensions.clone()),
            ("sort", self.sort.clone()),
            ("filters", self.filters.clone()),
            ("max-results", self.max_results.to_string()),
        ]
    }
}

/// Strip the identifiers we'd rather not publish from a raw response.
///
/// Safe to apply repeatedly.
pub fn sanitize_response(mut response: Value) -> Value {
    if let Some(obj) = response.as_object_mut() {
        for key in SENSITIVE_KEYS {
            obj.remove(key);
        }
        if let Some(query) = obj.get_mut("query").and_then(Value::as_object_mut) {
            query.remove("ids");
        }
    }
    response
}

/// What a response says about the query that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseOrigin {
    pub kind: MetricKind,
    pub unit: DateUnit,
}

impl ResponseOrigin {
    /// Read the embedded `query` block of a response.
    pub fn from_response(response: &Value) -> Result<Self, MetricsError> {
        let query = response
            .get("query")
            .ok_or_else(|| MetricsError::InvalidResponse("missing `query` block".into()))?;

        let date = |key: &str| -> Result<NaiveDate, MetricsError> {
            let raw = query
                .get(key)
                .and_then(Value::as_str)
                .ok_or_else(|| MetricsError::InvalidResponse(format!("missing `query.{}`", key)))?;
            parse_ymd(raw)
                .map_err(|e| MetricsError::InvalidResponse(format!("bad `query.{}`: {}", key, e)))
        };
        let start = date("start-date")?;
        let end = date("end-date")?;

        let filters = query.get("filters").and_then(Value::as_str).unwrap_or("");
        let kind = if filters.contains(EVENT_LABEL_DIMENSION) {
            MetricKind::Downloads
        } else {
            MetricKind::Views
        };

        Ok(Self {
            kind,
            unit: DateUnit::new(start, end),
        })
    }
}

/// The `filters` a cached response was gathered with, if it recorded them.
pub fn response_filters(response: &Value) -> Option<&str> {
    response.get("query")?.get("filters")?.as_str()
}

/// A raw (dimension, count) row. Counts arrive as strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub dimension: String,
    pub count: String,
}

impl RawRow {
    pub fn new(dimension: impl Into<String>, count: impl Into<String>) -> Self {
        Self {
            dimension: dimension.into(),
            count: count.into(),
        }
    }

    pub fn parsed_count(&self) -> Option<u64> {
        self.count.trim().parse().ok()
    }
}

/// Pull the `rows` out of a response. A missing `rows` key means no matches.
pub fn response_rows(response: &Value) -> Vec<RawRow> {
    let Some(rows) = response.get("rows").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let cells = row.as_array()?;
            let dimension = cells.first()?.as_str()?.to_string();
            let count = match cells.get(1)? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some(RawRow { dimension, count })
        })
        .collect()
}
