use rust_decimal::Decimal;
use starlink_client::domain::UsageDraft;
use time::{macros::date, Date};

use crate::pipeline::{Envelope, PipelineError, Transform};

const MIN_DATE: Date = date!(2000 - 01 - 01);
const MAX_DATE: Date = date!(2100 - 01 - 01);
/// Largest value a `NUMERIC(10,2)` column holds is 99_999_999.99.
const AMOUNT_LIMIT: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);
/// Key fields of the wide report rows.
const RESERVED_UNITS: [&str; 2] = ["date", "month"];

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unit must not be empty")]
    EmptyUnit,
    #[error("unit name '{0}' is reserved")]
    ReservedUnit(String),
    #[error("amount must be non-negative, got {0}")]
    NegativeAmount(Decimal),
    #[error("amount {0} has more than 2 decimal places")]
    TooPrecise(Decimal),
    #[error("amount {0} is too large")]
    AmountTooLarge(Decimal),
    #[error("date {0} is outside the allowed range")]
    DateOutOfRange(Date),
}

/// Pure validation and normalization of a `UsageDraft`.
///
/// Rules:
/// - unit must be non-empty after trimming; the trimmed value is kept.
///   `date` and `month` are refused.
/// - amount must be non-negative, below 10^8, with at most 2 decimal places.
///   It is rescaled to exactly 2 places.
/// - date must be within [2000-01-01, 2100-01-01].
pub fn validate_draft(mut draft: UsageDraft) -> Result<UsageDraft, ValidationError> {
    let unit = draft.unit.trim();
    if unit.is_empty() {
        return Err(ValidationError::EmptyUnit);
    }
    if RESERVED_UNITS.contains(&unit) {
        return Err(ValidationError::ReservedUnit(unit.to_string()));
    }
    if unit.len() != draft.unit.len() {
        draft.unit = unit.to_string();
    }

    if draft.amount.is_sign_negative() && !draft.amount.is_zero() {
        return Err(ValidationError::NegativeAmount(draft.amount));
    }
    if draft.amount >= AMOUNT_LIMIT {
        return Err(ValidationError::AmountTooLarge(draft.amount));
    }
    let mut amount = draft.amount.normalize();
    if amount.scale() > 2 {
        return Err(ValidationError::TooPrecise(draft.amount));
    }
    amount.rescale(2);
    draft.amount = amount;

    if draft.date < MIN_DATE || draft.date > MAX_DATE {
        return Err(ValidationError::DateOutOfRange(draft.date));
    }

    Ok(draft)
}

#[derive(Clone, Default)]
pub struct UsageDraftValidation;

#[async_trait::async_trait]
impl Transform<UsageDraft, UsageDraft> for UsageDraftValidation {
    async fn apply(
        &self,
        input: Envelope<UsageDraft>,
    ) -> Result<Envelope<UsageDraft>, PipelineError> {
        let line = input.line;
        match validate_draft(input.payload) {
            Ok(payload) => Ok(Envelope { payload, line }),
            Err(e) => {
                metrics::counter!("validation_usage_rejected_total").increment(1);
                Err(PipelineError::Rejected {
                    line,
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn draft(date: Date, unit: &str, amount: Decimal) -> UsageDraft {
        UsageDraft {
            date,
            unit: unit.to_string(),
            amount,
        }
    }

    #[test]
    fn valid_draft_is_normalized() {
        let padded = draft(date!(2024 - 01 - 01), "  Camp-North ", dec!(12.5));
        let out = validate_draft(padded).unwrap();
        assert_eq!(out.unit, "Camp-North");
        assert_eq!(out.amount.to_string(), "12.50");

        let out = validate_draft(draft(date!(2024 - 01 - 01), "A", dec!(3.1400))).unwrap();
        assert_eq!(out.amount.to_string(), "3.14");
    }

    #[test]
    fn zero_is_a_valid_amount() {
        let out = validate_draft(draft(date!(2024 - 01 - 01), "A", dec!(0))).unwrap();
        assert_eq!(out.amount.to_string(), "0.00");
    }

    #[test]
    fn rejects_blank_unit() {
        let res = validate_draft(draft(date!(2024 - 01 - 01), "   ", dec!(1)));
        assert_eq!(res, Err(ValidationError::EmptyUnit));
    }

    #[test]
    fn rejects_units_named_like_report_keys() {
        for name in ["date", " month "] {
            let res = validate_draft(draft(date!(2024 - 01 - 01), name, dec!(1)));
            assert_eq!(res, Err(ValidationError::ReservedUnit(name.trim().to_string())));
        }
        assert!(validate_draft(draft(date!(2024 - 01 - 01), "Date", dec!(1))).is_ok());
    }

    #[test]
    fn rejects_negative_amount() {
        let res = validate_draft(draft(date!(2024 - 01 - 01), "A", dec!(-0.01)));
        assert_eq!(res, Err(ValidationError::NegativeAmount(dec!(-0.01))));
    }

    #[test]
    fn rejects_sub_cent_amount() {
        let res = validate_draft(draft(date!(2024 - 01 - 01), "A", dec!(1.005)));
        assert!(matches!(res, Err(ValidationError::TooPrecise(_))));
    }

    #[test]
    fn rejects_amount_beyond_column_width() {
        let res = validate_draft(draft(date!(2024 - 01 - 01), "A", dec!(100000000)));
        assert!(matches!(res, Err(ValidationError::AmountTooLarge(_))));
        assert!(validate_draft(draft(date!(2024 - 01 - 01), "A", dec!(99999999.99))).is_ok());
    }

    #[test]
    fn rejects_out_of_range_date() {
        let res = validate_draft(draft(date!(1999 - 12 - 31), "A", dec!(1)));
        assert!(matches!(res, Err(ValidationError::DateOutOfRange(_))));
    }

    #[tokio::test]
    async fn pipeline_transform_tags_rejections_with_line() {
        let env = Envelope {
            payload: draft(date!(2024 - 01 - 01), "", dec!(1)),
            line: 7,
        };

        let res = UsageDraftValidation.apply(env).await;
        assert!(matches!(res, Err(PipelineError::Rejected { line: 7, .. })));
    }
}
