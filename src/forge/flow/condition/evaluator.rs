//! Condition evaluator
//!
//! Pure comparison of already-resolved values; fetching fields and answers is the
//! executor's job.

use std::cmp::Ordering;

use super::operator::ConditionOperator;
use crate::kit::value::FlowValue;

/// Evaluate `subject <op> expected`
pub fn evaluate(op: ConditionOperator, subject: &FlowValue, expected: &FlowValue) -> bool {
    match op {
        ConditionOperator::IsEmpty => subject.is_empty(),
        ConditionOperator::IsNotEmpty => !subject.is_empty(),
        ConditionOperator::Equals => values_equal(subject, expected),
        ConditionOperator::GreaterThan => compare(subject, expected) == Some(Ordering::Greater),
        ConditionOperator::LessThan => compare(subject, expected) == Some(Ordering::Less),
    }
}

/// Order two values, or `None` when they are not comparable.
///
/// Dates compare by calendar day, numbers numerically, text numerically when both
/// sides parse as numbers, then as dates, and lexically otherwise.
pub fn compare(left: &FlowValue, right: &FlowValue) -> Option<Ordering> {
    match (left, right) {
        (FlowValue::Empty, _) | (_, FlowValue::Empty) => None,
        (FlowValue::List(_), _) | (_, FlowValue::List(_)) => None,
        (FlowValue::Date(_), _) | (_, FlowValue::Date(_)) => {
            Some(left.as_date()?.cmp(&right.as_date()?))
        }
        (FlowValue::Number(_), _) | (_, FlowValue::Number(_)) => {
            left.as_number()?.partial_cmp(&right.as_number()?)
        }
        (FlowValue::Text(a), FlowValue::Text(b)) => {
            if let (Some(x), Some(y)) = (left.as_number(), right.as_number()) {
                x.partial_cmp(&y)
            } else if let (Some(x), Some(y)) = (left.as_date(), right.as_date()) {
                Some(x.cmp(&y))
            } else {
                Some(a.cmp(b))
            }
        }
    }
}

fn values_equal(subject: &FlowValue, expected: &FlowValue) -> bool {
    match (subject, expected) {
        (FlowValue::Empty, FlowValue::Empty) => true,
        (FlowValue::List(items), FlowValue::List(other)) => {
            let mut a = items.clone();
            let mut b = other.clone();
            a.sort();
            b.sort();
            a == b
        }
        // A multi-value subject equals a scalar it contains
        (FlowValue::List(items), scalar) => items
            .iter()
            .any(|item| compare(&FlowValue::Text(item.clone()), scalar) == Some(Ordering::Equal)),
        _ => compare(subject, expected) == Some(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> FlowValue {
        FlowValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn text(s: &str) -> FlowValue {
        FlowValue::Text(s.to_string())
    }

    #[test]
    fn test_date_equality_ignores_time_of_day() {
        let expected = date(2024, 1, 15);
        assert!(evaluate(
            ConditionOperator::Equals,
            &text("2024-01-15T17:45:00.000+0000"),
            &expected
        ));
        assert!(evaluate(
            ConditionOperator::Equals,
            &text("2024-01-15T00:00:01Z"),
            &expected
        ));
        assert!(!evaluate(
            ConditionOperator::Equals,
            &text("2024-01-16T00:00:00Z"),
            &expected
        ));
    }

    #[test]
    fn test_date_ordering_is_strict() {
        let subject = date(2024, 1, 10);
        assert!(evaluate(
            ConditionOperator::GreaterThan,
            &subject,
            &date(2024, 1, 9)
        ));
        assert!(!evaluate(
            ConditionOperator::GreaterThan,
            &subject,
            &date(2024, 1, 10)
        ));
        assert!(evaluate(
            ConditionOperator::LessThan,
            &subject,
            &date(2024, 1, 11)
        ));
        assert!(!evaluate(
            ConditionOperator::LessThan,
            &text("2024-01-10T23:59:59Z"),
            &subject
        ));
    }

    #[test]
    fn test_number_comparison() {
        let subject = FlowValue::Number(7.5);
        assert!(evaluate(
            ConditionOperator::GreaterThan,
            &subject,
            &FlowValue::Number(5.0)
        ));
        assert!(evaluate(ConditionOperator::LessThan, &subject, &text("10")));
        assert!(evaluate(
            ConditionOperator::Equals,
            &subject,
            &FlowValue::Number(7.5)
        ));
        assert!(!evaluate(ConditionOperator::Equals, &subject, &text("abc")));
    }

    #[test]
    fn test_number_equality_is_exact_at_any_magnitude() {
        let tiny = FlowValue::Number(1e-20);
        assert!(!evaluate(ConditionOperator::Equals, &tiny, &FlowValue::Number(2e-20)));
        assert!(evaluate(ConditionOperator::LessThan, &tiny, &FlowValue::Number(2e-20)));

        let large = FlowValue::Number(1e12);
        assert!(!evaluate(
            ConditionOperator::Equals,
            &large,
            &FlowValue::Number(1e12 + 1.0)
        ));
        assert!(evaluate(ConditionOperator::Equals, &large, &text("1000000000000")));
        assert!(!evaluate(
            ConditionOperator::Equals,
            &FlowValue::Number(f64::NAN),
            &FlowValue::Number(f64::NAN)
        ));
    }

    #[test]
    fn test_numeric_text_compares_numerically() {
        assert!(evaluate(ConditionOperator::GreaterThan, &text("10"), &text("9")));
        assert!(evaluate(ConditionOperator::Equals, &text("3"), &text("3.0")));
    }

    #[test]
    fn test_text_comparison() {
        assert!(evaluate(ConditionOperator::Equals, &text("Bug"), &text("Bug")));
        assert!(!evaluate(ConditionOperator::Equals, &text("Bug"), &text("bug")));
        assert!(evaluate(ConditionOperator::LessThan, &text("alpha"), &text("beta")));
    }

    #[test]
    fn test_empty_checks() {
        for empty in [FlowValue::Empty, text(""), FlowValue::List(vec![])] {
            assert!(evaluate(ConditionOperator::IsEmpty, &empty, &FlowValue::Empty));
            assert!(!evaluate(
                ConditionOperator::IsNotEmpty,
                &empty,
                &FlowValue::Empty
            ));
        }
        for present in [text("x"), FlowValue::Number(0.0), date(2024, 1, 1)] {
            assert!(!evaluate(ConditionOperator::IsEmpty, &present, &FlowValue::Empty));
            assert!(evaluate(
                ConditionOperator::IsNotEmpty,
                &present,
                &FlowValue::Empty
            ));
        }
    }

    #[test]
    fn test_empty_subject_never_compares() {
        assert!(!evaluate(
            ConditionOperator::GreaterThan,
            &FlowValue::Empty,
            &date(2024, 1, 1)
        ));
        assert!(!evaluate(
            ConditionOperator::LessThan,
            &FlowValue::Empty,
            &FlowValue::Number(1.0)
        ));
        assert!(!evaluate(
            ConditionOperator::Equals,
            &FlowValue::Empty,
            &text("x")
        ));
    }

    #[test]
    fn test_list_membership_and_set_equality() {
        let subject = FlowValue::List(vec!["backend".into(), "urgent".into()]);
        assert!(evaluate(ConditionOperator::Equals, &subject, &text("urgent")));
        assert!(!evaluate(ConditionOperator::Equals, &subject, &text("frontend")));
        assert!(evaluate(
            ConditionOperator::Equals,
            &subject,
            &FlowValue::List(vec!["urgent".into(), "backend".into()])
        ));
        assert!(!evaluate(
            ConditionOperator::GreaterThan,
            &subject,
            &text("a")
        ));
    }

    #[test]
    fn test_unparseable_date_is_not_equal() {
        assert!(!evaluate(
            ConditionOperator::Equals,
            &text("soon"),
            &date(2024, 1, 1)
        ));
    }
}
