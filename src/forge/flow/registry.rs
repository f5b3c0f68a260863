// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::graph::FlowDefinition;
use crate::kit::error::ConfigError;

/// Validated flow definitions by id
#[derive(Clone)]
pub struct FlowRegistry {
    flows: Arc<RwLock<HashMap<String, Arc<FlowDefinition>>>>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self {
            flows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a flow, replacing any flow with the same id. Invalid flows are rejected.
    pub async fn register(&self, flow: FlowDefinition) -> Result<(), ConfigError> {
        flow.ensure_valid()?;
        log::info!("Registered flow '{}' ({} nodes)", flow.id, flow.nodes.len());
        let mut flows = self.flows.write().await;
        flows.insert(flow.id.clone(), Arc::new(flow));
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<Arc<FlowDefinition>> {
        let flows = self.flows.read().await;
        flows.get(id).cloned()
    }

    /// All flows sorted by id
    pub async fn list(&self) -> Vec<Arc<FlowDefinition>> {
        let flows = self.flows.read().await;
        let mut all: Vec<_> = flows.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Flows bound to `project`
    pub async fn flows_for_project(&self, project: &str) -> Vec<Arc<FlowDefinition>> {
        self.list()
            .await
            .into_iter()
            .filter(|f| f.projects.iter().any(|p| p.eq_ignore_ascii_case(project)))
            .collect()
    }
}

impl Default for FlowRegistry {
    fn default() -> Self {
        Self::new()
    }
}
