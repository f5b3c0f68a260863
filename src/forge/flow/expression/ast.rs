// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree for date expressions

use std::fmt;

/// A parsed date expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateExpression {
    /// Calendar anchor: `today()`, `endofmonth()`, ...
    Function(DateFunction),
    /// Signed offset from today: `7d`, `-2w`
    Relative(Offset),
    /// Anchor shifted by an offset: `startofweek() - 1d`
    Combined {
        function: DateFunction,
        op: OffsetOp,
        /// Always non-negative; `op` carries the sign
        offset: Offset,
    },
}

/// The supported calendar anchor functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFunction {
    Today,
    StartOfWeek,
    EndOfWeek,
    StartOfMonth,
    EndOfMonth,
    StartOfYear,
    EndOfYear,
}

impl DateFunction {
    pub const ALL: [DateFunction; 7] = [
        DateFunction::Today,
        DateFunction::StartOfWeek,
        DateFunction::EndOfWeek,
        DateFunction::StartOfMonth,
        DateFunction::EndOfMonth,
        DateFunction::StartOfYear,
        DateFunction::EndOfYear,
    ];

    /// Canonical (lowercase) source token
    pub fn token(&self) -> &'static str {
        match self {
            DateFunction::Today => "today()",
            DateFunction::StartOfWeek => "startofweek()",
            DateFunction::EndOfWeek => "endofweek()",
            DateFunction::StartOfMonth => "startofmonth()",
            DateFunction::EndOfMonth => "endofmonth()",
            DateFunction::StartOfYear => "startofyear()",
            DateFunction::EndOfYear => "endofyear()",
        }
    }

    /// Look up a function by its lowercase token
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.token() == token)
    }
}

/// A count of calendar units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub count: i64,
    pub unit: DateUnit,
}

impl Offset {
    pub fn new(count: i64, unit: DateUnit) -> Self {
        Self { count, unit }
    }
}

/// Calendar units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    /// d
    Days,
    /// w
    Weeks,
    /// m
    Months,
    /// y
    Years,
}

impl DateUnit {
    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'd' => Some(DateUnit::Days),
            'w' => Some(DateUnit::Weeks),
            'm' => Some(DateUnit::Months),
            'y' => Some(DateUnit::Years),
            _ => None,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            DateUnit::Days => 'd',
            DateUnit::Weeks => 'w',
            DateUnit::Months => 'm',
            DateUnit::Years => 'y',
        }
    }
}

/// Operator joining an anchor and an offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetOp {
    Plus,
    Minus,
}

impl fmt::Display for DateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.letter())
    }
}

impl fmt::Display for OffsetOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetOp::Plus => write!(f, "+"),
            OffsetOp::Minus => write!(f, "-"),
        }
    }
}

impl fmt::Display for DateExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateExpression::Function(func) => write!(f, "{}", func),
            DateExpression::Relative(offset) => write!(f, "{}", offset),
            DateExpression::Combined {
                function,
                op,
                offset,
            } => write!(f, "{} {} {}", function, op, offset),
        }
    }
}
