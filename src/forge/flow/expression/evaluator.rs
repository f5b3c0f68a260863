//! Date expression evaluator
//!
//! Resolves an AST against a caller-supplied calendar day. There are no clock reads in
//! here; the same `today` always produces the same date.

use chrono::{Datelike, Days, Months, NaiveDate};

use super::ast::{DateExpression, DateFunction, DateUnit, Offset, OffsetOp};
use super::parser::parse;
use crate::kit::error::ExpressionError;

/// Evaluate an expression relative to `today` (the local calendar day of "now")
pub fn evaluate(expr: &DateExpression, today: NaiveDate) -> Result<NaiveDate, ExpressionError> {
    let resolved = match expr {
        DateExpression::Function(function) => anchor(*function, today),
        DateExpression::Relative(offset) => shift(today, offset.count, offset.unit),
        DateExpression::Combined {
            function,
            op,
            offset,
        } => {
            let count = match op {
                OffsetOp::Plus => Some(offset.count),
                OffsetOp::Minus => offset.count.checked_neg(),
            };
            anchor(*function, today)
                .zip(count)
                .and_then(|(base, count)| shift(base, count, offset.unit))
        }
    };

    resolved.ok_or_else(|| ExpressionError::OutOfRange(expr.to_string()))
}

/// Parse and evaluate in one step
pub fn resolve(input: &str, today: NaiveDate) -> Result<NaiveDate, ExpressionError> {
    let expr = parse(input)?;
    evaluate(&expr, today)
}

fn anchor(function: DateFunction, today: NaiveDate) -> Option<NaiveDate> {
    match function {
        DateFunction::Today => Some(today),
        DateFunction::StartOfWeek => start_of_week(today),
        DateFunction::EndOfWeek => start_of_week(today)?.checked_add_days(Days::new(6)),
        DateFunction::StartOfMonth => today.with_day(1),
        DateFunction::EndOfMonth => today
            .with_day(1)?
            .checked_add_months(Months::new(1))?
            .pred_opt(),
        DateFunction::StartOfYear => NaiveDate::from_ymd_opt(today.year(), 1, 1),
        DateFunction::EndOfYear => NaiveDate::from_ymd_opt(today.year(), 12, 31),
    }
}

/// Monday of the ISO week containing `day`
fn start_of_week(day: NaiveDate) -> Option<NaiveDate> {
    day.checked_sub_days(Days::new(u64::from(day.weekday().num_days_from_monday())))
}

/// Move `base` by `count` units. Month and year steps clamp to the last valid day.
fn shift(base: NaiveDate, count: i64, unit: DateUnit) -> Option<NaiveDate> {
    match unit {
        DateUnit::Days => shift_days(base, count),
        DateUnit::Weeks => shift_days(base, count.checked_mul(7)?),
        DateUnit::Months => shift_months(base, count),
        DateUnit::Years => shift_months(base, count.checked_mul(12)?),
    }
}

fn shift_days(base: NaiveDate, count: i64) -> Option<NaiveDate> {
    let days = Days::new(count.unsigned_abs());
    if count >= 0 {
        base.checked_add_days(days)
    } else {
        base.checked_sub_days(days)
    }
}

fn shift_months(base: NaiveDate, count: i64) -> Option<NaiveDate> {
    let months = Months::new(u32::try_from(count.unsigned_abs()).ok()?);
    if count >= 0 {
        base.checked_add_months(months)
    } else {
        base.checked_sub_months(months)
    }
}

impl Offset {
    /// Apply this offset to `base`
    pub fn apply(&self, base: NaiveDate) -> Option<NaiveDate> {
        shift(base, self.count, self.unit)
    }
}
