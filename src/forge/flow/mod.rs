// SPDX-License-Identifier: MIT

pub mod audit;
pub mod condition;
pub mod expression;
pub mod graph;
pub mod loader;
pub mod registry;
pub mod session;
pub mod state;
