// SPDX-License-Identifier: MIT

//! Record-system integrations implementing the collaborator traits

pub mod jira;

pub use jira::{JiraClient, JiraConfig};
