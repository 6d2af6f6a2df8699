pub mod usage;

pub use usage::{
    iso_date, parse_calendar_date, DateRange, DecodeError, InvalidYearMonth, RawUsageRow,
    UsageDraft, UsageFilter, UsageRecord, YearMonth,
};
