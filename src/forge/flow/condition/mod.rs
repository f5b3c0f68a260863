// SPDX-License-Identifier: MIT

//! Condition evaluation for logic nodes
//!
//! A logic node compares one subject value (a field or an answer) against one expected
//! value using a single operator:
//! - `equals`, `greaterThan`, `lessThan` - day-level for dates, numeric or literal otherwise
//! - `isEmpty`, `isNotEmpty` - presence checks that ignore the expected value

mod evaluator;
mod operator;

pub use evaluator::{compare, evaluate};
pub use operator::ConditionOperator;
