//! Query windows and the dates that bound them.

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::fmt;

use super::article::MetricKind;

/// Date format used by the analytics API and the cache layout.
pub const YMD: &str = "%Y-%m-%d";

/// Earliest day with usable page-view data.
pub const VIEWS_INCEPTION: NaiveDate = match NaiveDate::from_ymd_opt(2014, 3, 12) {
    Some(d) => d,
    None => panic!("invalid views inception date"),
};

/// Earliest day with usable PDF download events.
pub const DOWNLOADS_INCEPTION: NaiveDate = match NaiveDate::from_ymd_opt(2015, 2, 13) {
    Some(d) => d,
    None => panic!("invalid downloads inception date"),
};

pub fn ymd(date: NaiveDate) -> String {
    date.format(YMD).to_string()
}

pub fn parse_ymd(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s, YMD)
}

impl MetricKind {
    /// First date for which this kind has been collected.
    pub fn inception(&self) -> NaiveDate {
        match self {
            MetricKind::Views => VIEWS_INCEPTION,
            MetricKind::Downloads => DOWNLOADS_INCEPTION,
        }
    }
}

/// One atomic analytics query window, inclusive at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateUnit {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateUnit {
    /// Build a unit, swapping the endpoints if they arrive reversed.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn is_single_day(&self) -> bool {
        self.start == self.end
    }

    /// A window reaching today or later can still gain data.
    pub fn is_partial(&self, today: NaiveDate) -> bool {
        self.end >= today
    }

    /// `2015-01-01` for a single day, `2015-01-01_2015-01-31` otherwise.
    pub fn label(&self) -> String {
        if self.is_single_day() {
            ymd(self.start)
        } else {
            format!("{}_{}", ymd(self.start), ymd(self.end))
        }
    }
}

impl fmt::Display for DateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for DateUnit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
