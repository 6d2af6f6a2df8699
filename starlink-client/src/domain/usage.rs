use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use time::{macros::format_description, Date, OffsetDateTime};

time::serde::format_description!(pub iso_date, Date, "[year]-[month]-[day]");

/// One logged measurement of satellite-internet usage for a unit on a day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: i32,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub unit: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Client-supplied fields of a usage record, used for create, update and import.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UsageDraft {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub unit: String,
    pub amount: Decimal,
}

/// A usage row as handed over by an external backend, before its date is checked.
///
/// `amount` accepts both JSON numbers and decimal strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUsageRow {
    pub id: i32,
    pub date: String,
    pub unit: String,
    pub amount: Decimal,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("row {id}: invalid calendar date '{value}'")]
    InvalidDate { id: i32, value: String },
    #[error("row {id}: unit is empty")]
    EmptyUnit { id: i32 },
}

impl TryFrom<RawUsageRow> for UsageRecord {
    type Error = DecodeError;

    fn try_from(row: RawUsageRow) -> Result<Self, Self::Error> {
        let date = parse_calendar_date(&row.date).map_err(|_| DecodeError::InvalidDate {
            id: row.id,
            value: row.date.clone(),
        })?;
        if row.unit.trim().is_empty() {
            return Err(DecodeError::EmptyUnit { id: row.id });
        }

        let created_at = row.created_at.unwrap_or_else(OffsetDateTime::now_utc);
        Ok(UsageRecord {
            id: row.id,
            date,
            unit: row.unit,
            amount: row.amount,
            created_at,
            updated_at: row.updated_at.unwrap_or(created_at),
        })
    }
}

/// Parse an ISO-8601 calendar date.
///
/// A trailing time component (`2024-01-31T23:30:00-05:00`) is ignored rather
/// than converted, so the calendar day written by the producer is kept.
pub fn parse_calendar_date(s: &str) -> Result<Date, time::error::Parse> {
    let s = s.trim();
    let day_part = match s.get(..10) {
        Some(prefix) if s.len() > 10 && s[10..].starts_with(['T', ' ']) => prefix,
        _ => s,
    };
    Date::parse(day_part, format_description!("[year]-[month]-[day]"))
}

/// Inclusive calendar-date bounds. Either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<Date>,
    pub end: Option<Date>,
}

impl DateRange {
    pub fn new(start: Option<Date>, end: Option<Date>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: Date) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

/// Row selection applied at the storage boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageFilter {
    pub range: DateRange,
    pub unit: Option<String>,
}

impl UsageFilter {
    pub fn matches(&self, record: &UsageRecord) -> bool {
        self.range.contains(record.date) && self.unit.as_deref().map_or(true, |u| u == record.unit)
    }
}

/// A calendar month, rendered and parsed as zero-padded `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u8,
}

impl YearMonth {
    pub fn new(year: i32, month: u8) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Month of a calendar date. No timezone is involved.
    pub fn of(date: Date) -> Self {
        Self {
            year: date.year(),
            month: date.month() as u8,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid month '{0}', expected YYYY-MM")]
pub struct InvalidYearMonth(pub String);

impl FromStr for YearMonth {
    type Err = InvalidYearMonth;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidYearMonth(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4
            || month.len() != 2
            || !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u8 = month.parse().map_err(|_| invalid())?;
        YearMonth::new(year, month).ok_or_else(invalid)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
