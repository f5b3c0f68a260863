// SPDX-License-Identifier: MIT

//! Comparison operators available to logic nodes

use serde::{Deserialize, Serialize};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Equals,
    GreaterThan,
    LessThan,
    IsEmpty,
    IsNotEmpty,
}

impl ConditionOperator {
    /// Whether the operator compares against an expected value at all
    pub fn needs_expected(&self) -> bool {
        !matches!(
            self,
            ConditionOperator::IsEmpty | ConditionOperator::IsNotEmpty
        )
    }
}

impl std::fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionOperator::Equals => write!(f, "equals"),
            ConditionOperator::GreaterThan => write!(f, "greaterThan"),
            ConditionOperator::LessThan => write!(f, "lessThan"),
            ConditionOperator::IsEmpty => write!(f, "isEmpty"),
            ConditionOperator::IsNotEmpty => write!(f, "isNotEmpty"),
        }
    }
}
