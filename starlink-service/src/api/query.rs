use serde::Deserialize;
use starlink_client::domain::{parse_calendar_date, DateRange, UsageFilter};
use time::Date;

/// Shapes the report endpoint can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Date,
    DateAndUnit,
    Month,
    MonthAndUnit,
}

impl GroupBy {
    /// Unknown values yield `None`, which selects the raw listing.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "date" => Some(GroupBy::Date),
            "dateAndUnit" => Some(GroupBy::DateAndUnit),
            "month" => Some(GroupBy::Month),
            "monthAndUnit" => Some(GroupBy::MonthAndUnit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::Date => "date",
            GroupBy::DateAndUnit => "dateAndUnit",
            GroupBy::Month => "month",
            GroupBy::MonthAndUnit => "monthAndUnit",
        }
    }
}

/// Query string of `GET /api/starlink/usage`. Every field is kept as text so
/// a malformed value degrades to "not given" instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub unit: Option<String>,
    pub group_by: Option<String>,
    pub month: Option<String>,
}

fn lenient_date(name: &str, value: Option<&str>) -> Option<Date> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match parse_calendar_date(value) {
        Ok(d) => Some(d),
        Err(e) => {
            tracing::debug!(param = name, value, error = %e, "ignoring malformed date parameter");
            None
        }
    }
}

impl ReportParams {
    pub fn range(&self) -> DateRange {
        DateRange::new(
            lenient_date("startDate", self.start_date.as_deref()),
            lenient_date("endDate", self.end_date.as_deref()),
        )
    }

    pub fn filter(&self) -> UsageFilter {
        UsageFilter {
            range: self.range(),
            unit: self
                .unit
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_owned),
        }
    }

    pub fn group_by(&self) -> Option<GroupBy> {
        self.group_by.as_deref().and_then(GroupBy::parse)
    }

    pub fn month(&self) -> Option<&str> {
        self.month.as_deref().filter(|m| !m.trim().is_empty())
    }
}
