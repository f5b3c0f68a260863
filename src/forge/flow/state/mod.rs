// SPDX-License-Identifier: MIT

//! Execution state for flow runs
//!
//! This module provides:
//! - `ExecutionState` - status, answers and last node of one (record, flow) pair
//! - `Answer` - a question answer validated against its answer type
//! - `ExecutionStore` - versioned persistence between passes

mod schema;
mod store;

pub use schema::{Answer, ExecutionKey, ExecutionState, ExecutionStatus};
pub use store::{ExecutionLease, ExecutionStore, InMemoryExecutionStore, JsonFileStore};
