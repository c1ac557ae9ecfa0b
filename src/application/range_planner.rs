//! Expands a requested date range into atomic query units.

use chrono::{Datelike, Days, Months, NaiveDate};
use std::collections::BTreeSet;
use tracing::warn;

use crate::domain::{DateUnit, MetricKind};

/// How a date range is cut into units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Daily,
    Monthly,
}

/// Every calendar day from `from` to `to` inclusive, in either order.
pub fn daily_units(from: NaiveDate, to: NaiveDate) -> Vec<DateUnit> {
    let span = DateUnit::new(from, to);
    span.start()
        .iter_days()
        .take_while(|day| *day <= span.end())
        .map(DateUnit::day)
        .collect()
}

/// Whole calendar months touched by the range, first to last day.
pub fn monthly_units(from: NaiveDate, to: NaiveDate) -> Vec<DateUnit> {
    let months: BTreeSet<(i32, u32)> = daily_units(from, to)
        .iter()
        .map(|unit| (unit.start().year(), unit.start().month()))
        .collect();

    months
        .into_iter()
        .filter_map(|(year, month)| {
            let first = NaiveDate::from_ymd_opt(year, month, 1)?;
            let last = first
                .checked_add_months(Months::new(1))?
                .checked_sub_days(Days::new(1))?;
            Some(DateUnit::new(first, last))
        })
        .collect()
}

pub fn units(granularity: Granularity, from: NaiveDate, to: NaiveDate) -> Vec<DateUnit> {
    match granularity {
        Granularity::Daily => daily_units(from, to),
        Granularity::Monthly => monthly_units(from, to),
    }
}

/// True when both ends of the unit are on or after the kind's inception.
pub fn is_valid(unit: &DateUnit, kind: MetricKind) -> bool {
    let inception = kind.inception();
    unit.start() >= inception && unit.end() >= inception
}

/// Drop units that reach back before the kind's inception. Units are
/// skipped whole, never clamped.
pub fn valid_units(units: &[DateUnit], kind: MetricKind) -> Vec<DateUnit> {
    units
        .iter()
        .filter(|unit| {
            let ok = is_valid(unit, kind);
            if !ok {
                warn!(
                    "skipping {} for {}: older than known inception {}",
                    unit,
                    kind,
                    kind.inception()
                );
            }
            ok
        })
        .copied()
        .collect()
}
