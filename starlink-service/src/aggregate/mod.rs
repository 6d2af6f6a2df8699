//! Usage reports built from a snapshot of [`UsageRecord`]s.
//!
//! Every function here is a single pass over borrowed input with locally owned
//! accumulators, so the functions are safe to call from concurrent handlers.
//! Sums use [`Decimal`], which keeps 2-decimal amounts exact.
//!
//! Date bounds are inclusive and are re-applied even when the storage layer
//! already filtered on them: month rows are coarser than the day filter, and
//! a month row must never pick up days outside the requested range.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{ser::SerializeMap, Serialize, Serializer};
use starlink_client::domain::{DateRange, UsageRecord, YearMonth};
use time::Date;

/// Grouping key of a report row.
pub trait Period: Copy + Ord {
    /// JSON field holding the key.
    const FIELD: &'static str;

    fn of(date: Date) -> Self;

    fn label(&self) -> String;
}

impl Period for Date {
    const FIELD: &'static str = "date";

    fn of(date: Date) -> Self {
        date
    }

    fn label(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year(), self.month() as u8, self.day())
    }
}

impl Period for YearMonth {
    const FIELD: &'static str = "month";

    fn of(date: Date) -> Self {
        YearMonth::of(date)
    }

    fn label(&self) -> String {
        self.to_string()
    }
}

/// `{ "<date|month>": key, "totalUsage": n }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodTotal<K> {
    pub key: K,
    pub total_usage: Decimal,
}

/// `{ "<date|month>": key, "<unit>": n, ... }` holding only units with data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitBreakdown<K> {
    pub key: K,
    pub values: BTreeMap<String, Decimal>,
}

pub type DateTotal = PeriodTotal<Date>;
pub type MonthTotal = PeriodTotal<YearMonth>;
pub type DateUnitRow = UnitBreakdown<Date>;
pub type MonthUnitRow = UnitBreakdown<YearMonth>;

struct AsFloat<'a>(&'a Decimal);

impl Serialize for AsFloat<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        rust_decimal::serde::float::serialize(self.0, serializer)
    }
}

impl<K: Period> Serialize for PeriodTotal<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(K::FIELD, &self.key.label())?;
        map.serialize_entry("totalUsage", &AsFloat(&self.total_usage))?;
        map.end()
    }
}

impl<K: Period> Serialize for UnitBreakdown<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let label = self.key.label();
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(K::FIELD, &label)?;
        for (unit, total) in &self.values {
            // Would overwrite the key field.
            if unit == K::FIELD {
                tracing::warn!(
                    unit = %unit,
                    key = %label,
                    "unit name collides with report key, omitted"
                );
                continue;
            }
            map.serialize_entry(unit, &AsFloat(total))?;
        }
        map.end()
    }
}

fn in_range<'a>(
    records: &'a [UsageRecord],
    range: DateRange,
) -> impl Iterator<Item = &'a UsageRecord> {
    records.iter().filter(move |r| range.contains(r.date))
}

fn totals_by<K: Period>(records: &[UsageRecord], range: DateRange) -> Vec<PeriodTotal<K>> {
    let mut sums: BTreeMap<K, Decimal> = BTreeMap::new();
    for r in in_range(records, range) {
        *sums.entry(K::of(r.date)).or_insert(Decimal::ZERO) += r.amount;
    }

    sums.into_iter()
        .map(|(key, total_usage)| PeriodTotal { key, total_usage })
        .collect()
}

fn breakdown_by<K: Period>(records: &[UsageRecord], range: DateRange) -> Vec<UnitBreakdown<K>> {
    let mut sums: BTreeMap<K, BTreeMap<String, Decimal>> = BTreeMap::new();
    for r in in_range(records, range) {
        let per_unit = sums.entry(K::of(r.date)).or_default();
        match per_unit.get_mut(&r.unit) {
            Some(total) => *total += r.amount,
            None => {
                per_unit.insert(r.unit.clone(), r.amount);
            }
        }
    }

    sums.into_iter()
        .map(|(key, values)| UnitBreakdown { key, values })
        .collect()
}

/// Resolve an optional `YYYY-MM` filter. `Err(())` means the filter was
/// given but unparseable, which matches nothing.
fn month_filter(month: Option<&str>) -> Result<Option<YearMonth>, ()> {
    match month {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<YearMonth>().map(Some).map_err(|e| {
            tracing::debug!(error = %e, "month filter matches nothing");
        }),
    }
}

/// Total usage per day, ascending by date.
pub fn aggregate_by_date(
    records: &[UsageRecord],
    start: Option<Date>,
    end: Option<Date>,
) -> Vec<DateTotal> {
    totals_by(records, DateRange::new(start, end))
}

/// Per-unit usage per day, ascending by date.
pub fn aggregate_by_date_and_unit(
    records: &[UsageRecord],
    start: Option<Date>,
    end: Option<Date>,
) -> Vec<DateUnitRow> {
    breakdown_by(records, DateRange::new(start, end))
}

/// Total usage per calendar month, ascending, optionally narrowed to `month`.
pub fn aggregate_by_month(
    records: &[UsageRecord],
    start: Option<Date>,
    end: Option<Date>,
    month: Option<&str>,
) -> Vec<MonthTotal> {
    let Ok(only) = month_filter(month) else {
        return Vec::new();
    };

    let mut rows = totals_by(records, DateRange::new(start, end));
    if let Some(only) = only {
        rows.retain(|r| r.key == only);
    }
    rows
}

/// Per-unit usage per calendar month, ascending, optionally narrowed to `month`.
pub fn aggregate_by_month_and_unit(
    records: &[UsageRecord],
    start: Option<Date>,
    end: Option<Date>,
    month: Option<&str>,
) -> Vec<MonthUnitRow> {
    let Ok(only) = month_filter(month) else {
        return Vec::new();
    };

    let mut rows = breakdown_by(records, DateRange::new(start, end));
    if let Some(only) = only {
        rows.retain(|r| r.key == only);
    }
    rows
}

/// Every unit present in `records`, ascending, without duplicates.
pub fn distinct_units(records: &[UsageRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.unit.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_owned)
        .collect()
}
