// SPDX-License-Identifier: MIT

//! Decision-flow evaluation engine for guided Jira issue workflows.
//!
//! - [`kit`] holds the error taxonomy, resolved values, collaborator traits and config.
//! - [`forge`] holds the flow engine, the Jira integration and the HTTP server.

pub mod forge;
pub mod kit;
