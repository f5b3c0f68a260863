// SPDX-License-Identifier: MIT

//! Flow graphs: definitions, validation and execution
//!
//! Example:
//! ```yaml
//! id: due-date
//! name: Due date follow-up
//! nodes:
//!   - id: start
//!     type: start
//!   - id: has_due
//!     type: logic
//!     subject: { kind: field, key: duedate }
//!     operator: isEmpty
//!   - id: set_due
//!     type: action
//!     action: setField
//!     field: duedate
//!     value: { kind: date, expression: "endofweek() + 1w" }
//! edges:
//!   - { source: start, target: has_due }
//!   - { source: has_due, target: set_due, branch: true }
//! ```

mod executor;
mod resolver;
mod types;
mod validate;

pub use executor::{Advance, Collaborators, EmittedAction, FlowExecutor};
pub use resolver::ValueResolver;
pub use types::{
    ActionNode, AnswerType, Branch, Edge, FlowDefinition, LogicNode, Node, NodeKind, NodeType,
    QuestionNode, Subject, ValueSpec,
};
