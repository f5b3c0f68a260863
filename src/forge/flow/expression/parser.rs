//! Date expression parser
//!
//! Accepts, in order of precedence:
//! - relative offsets: `7d`, `-2w`, `+1m`, `3y`
//! - anchor functions: `today()`, `startofweek()`, `endofmonth()`, ...
//! - combined terms: `today() + 7d`, `startofweek() - 1d`
//!
//! Matching is case-insensitive and tolerant of surrounding whitespace. The parser is
//! syntax-only: it never does date arithmetic and never panics on malformed input.

use super::ast::{DateExpression, DateFunction, DateUnit, Offset, OffsetOp};
use crate::kit::error::ExpressionError;

const END_OF_INPUT: &str = "<end>";

/// Parse a date expression string into an AST
pub fn parse(input: &str) -> Result<DateExpression, ExpressionError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ExpressionError::Empty);
    }

    // ASCII lowercasing keeps byte offsets aligned with `trimmed`
    let lowered = trimmed.to_ascii_lowercase();

    if let Some(offset) = parse_relative(&lowered, trimmed)? {
        return Ok(DateExpression::Relative(offset));
    }

    if let Some(function) = DateFunction::from_token(&lowered) {
        return Ok(DateExpression::Function(function));
    }

    if let Some(function) = leading_function(&lowered) {
        return parse_combined(function, &lowered, trimmed);
    }

    Err(diagnose(&lowered, 0, trimmed))
}

/// Parse a complete `[+-]?\d+[dwmy]` token; `Ok(None)` if the input has another shape
fn parse_relative(lowered: &str, original: &str) -> Result<Option<Offset>, ExpressionError> {
    let (negative, body) = match lowered.as_bytes().first() {
        Some(b'+') => (false, &lowered[1..]),
        Some(b'-') => (true, &lowered[1..]),
        _ => (false, lowered),
    };

    let Some(unit) = body.chars().last().and_then(DateUnit::from_letter) else {
        return Ok(None);
    };
    let digits = &body[..body.len() - 1];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(None);
    }

    let magnitude: i64 = digits
        .parse()
        .map_err(|_| ExpressionError::OutOfRange(original.to_string()))?;
    let count = if negative { -magnitude } else { magnitude };
    Ok(Some(Offset::new(count, unit)))
}

fn leading_function(lowered: &str) -> Option<DateFunction> {
    DateFunction::ALL
        .into_iter()
        .find(|f| lowered.starts_with(f.token()))
}

fn parse_combined(
    function: DateFunction,
    lowered: &str,
    original: &str,
) -> Result<DateExpression, ExpressionError> {
    let mut pos = skip_whitespace(lowered, function.token().len());

    let op = match lowered[pos..].chars().next() {
        Some('+') => OffsetOp::Plus,
        Some('-') => OffsetOp::Minus,
        _ => return Err(syntax_at(lowered, pos, original)),
    };
    pos = skip_whitespace(lowered, pos + 1);

    // The operator already supplies the sign; only a redundant '+' is tolerated
    match lowered[pos..].chars().next() {
        Some('-') => return Err(token_error(original, "-", pos)),
        Some('+') => pos += 1,
        _ => {}
    }

    let operand = &lowered[pos..];
    if operand.starts_with(['+', '-']) {
        return Err(syntax_at(lowered, pos, original));
    }
    match parse_relative(operand, original)? {
        Some(offset) => Ok(DateExpression::Combined {
            function,
            op,
            offset,
        }),
        None => Err(diagnose(lowered, pos, original)),
    }
}

/// Find the offending token of a fragment that should have been a relative offset or function
fn diagnose(lowered: &str, start: usize, original: &str) -> ExpressionError {
    let fragment = &lowered[start..];
    let sign_len = usize::from(fragment.starts_with(['+', '-']));
    let digit_len = fragment[sign_len..]
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .count();

    if digit_len == 0 {
        return syntax_at(lowered, start + sign_len, original);
    }

    // Digits were fine; blame whatever follows them
    let mut pos = start + sign_len + digit_len;
    if lowered[pos..]
        .chars()
        .next()
        .and_then(DateUnit::from_letter)
        .is_some()
    {
        pos += 1;
    }
    syntax_at(lowered, pos, original)
}

fn syntax_at(lowered: &str, pos: usize, original: &str) -> ExpressionError {
    let pos = skip_whitespace(lowered, pos);
    let rest = &lowered[pos..];
    let len = rest
        .char_indices()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, _)| i)
        .unwrap_or(rest.len());

    if len == 0 {
        token_error(original, END_OF_INPUT, pos)
    } else {
        token_error(original, &original[pos..pos + len], pos)
    }
}

fn token_error(original: &str, token: &str, position: usize) -> ExpressionError {
    ExpressionError::Syntax {
        input: original.to_string(),
        token: token.to_string(),
        position,
    }
}

fn skip_whitespace(s: &str, pos: usize) -> usize {
    pos + (s[pos..].len() - s[pos..].trim_start().len())
}
