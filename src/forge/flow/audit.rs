// SPDX-License-Identifier: MIT

//! Append-only audit trail of flow executions
//!
//! Sinks are best-effort: `append` cannot fail the caller. A sink that cannot persist an
//! entry logs the problem and drops the entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::forge::flow::condition::ConditionOperator;
use crate::forge::flow::graph::{Node, NodeType};
use crate::forge::flow::state::{Answer, ExecutionKey};
use crate::kit::collaborator::ActionDescriptor;
use crate::kit::error::BoxError;
use crate::kit::value::FlowValue;

/// One immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub record_id: String,
    pub flow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    pub outcome: AuditOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What happened at a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditOutcome {
    Started,
    AnswerReceived {
        answer: Answer,
    },
    Condition {
        operator: ConditionOperator,
        subject: FlowValue,
        expected: FlowValue,
        result: bool,
    },
    Action {
        action: ActionDescriptor,
        applied: bool,
    },
    AwaitingAnswer,
    Completed,
    Failed,
}

impl AuditLogEntry {
    pub fn new(
        key: &ExecutionKey,
        node: Option<&Node>,
        outcome: AuditOutcome,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            record_id: key.record_id.clone(),
            flow_id: key.flow_id.clone(),
            node_id: node.map(|n| n.id.clone()),
            node_type: node.map(Node::node_type),
            outcome,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn belongs_to(&self, key: &ExecutionKey) -> bool {
        self.record_id == key.record_id && self.flow_id == key.flow_id
    }
}

/// Destination for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record an entry. Must not fail the caller.
    async fn append(&self, entry: &AuditLogEntry);

    /// Entries for one execution in insertion order; sinks that cannot be read back return none
    async fn trail(&self, _key: &ExecutionKey) -> Result<Vec<AuditLogEntry>, BoxError> {
        Ok(Vec::new())
    }
}

/// In-process audit log, mostly for tests and the HTTP server
#[derive(Clone, Default)]
pub struct MemoryAuditLog {
    entries: Arc<RwLock<Vec<AuditLogEntry>>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn append(&self, entry: &AuditLogEntry) {
        self.entries.write().await.push(entry.clone());
    }

    async fn trail(&self, key: &ExecutionKey) -> Result<Vec<AuditLogEntry>, BoxError> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|e| e.belongs_to(key)).cloned().collect())
    }
}

/// Writes entries to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn append(&self, entry: &AuditLogEntry) {
        let node = entry.node_id.as_deref().unwrap_or("-");
        match &entry.error {
            Some(error) => log::warn!(
                "[audit] {}/{} node={} {:?}: {}",
                entry.record_id,
                entry.flow_id,
                node,
                entry.outcome,
                error
            ),
            None => log::info!(
                "[audit] {}/{} node={} {:?}",
                entry.record_id,
                entry.flow_id,
                node,
                entry.outcome
            ),
        }
    }
}

/// Append-only JSON Lines file
pub struct JsonLinesAuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn try_append(&self, entry: &AuditLogEntry) -> Result<(), BoxError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for JsonLinesAuditLog {
    async fn append(&self, entry: &AuditLogEntry) {
        if let Err(e) = self.try_append(entry).await {
            log::warn!(
                "Dropped audit entry {} for {}/{}: {}",
                entry.id,
                entry.record_id,
                entry.flow_id,
                e
            );
        }
    }

    async fn trail(&self, key: &ExecutionKey) -> Result<Vec<AuditLogEntry>, BoxError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditLogEntry>(line) {
                Ok(entry) if entry.belongs_to(key) => entries.push(entry),
                Ok(_) => {}
                Err(e) => log::warn!(
                    "Skipping malformed audit line {} in {}: {}",
                    index + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(entries)
    }
}
