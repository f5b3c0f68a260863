// SPDX-License-Identifier: MIT

//! Date expressions used in condition and action values
//!
//! Expressions are small and come in three shapes:
//! - `7d`, `-2w`, `1m`, `1y` - offsets from today
//! - `today()`, `startofweek()`, `endofmonth()`, ... - calendar anchors
//! - `startofweek() - 1d` - an anchor shifted by an offset

mod ast;
mod evaluator;
mod parser;

pub use ast::{DateExpression, DateFunction, DateUnit, Offset, OffsetOp};
pub use evaluator::{evaluate, resolve};
pub use parser::parse;
