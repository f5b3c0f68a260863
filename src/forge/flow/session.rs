// SPDX-License-Identifier: MIT

//! Request-facing flow service
//!
//! Wraps the executor in the load → advance → save → audit cycle. Passes for the same
//! (record, flow) pair are serialized through a per-key lock in this process and a store
//! lease across processes, so actions never run twice for one answer.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::audit::{AuditLogEntry, AuditSink};
use super::graph::{Advance, FlowExecutor};
use super::registry::FlowRegistry;
use super::state::{ExecutionKey, ExecutionState, ExecutionStore};
use crate::kit::error::FlowError;

/// One async mutex per execution key
#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<Mutex<HashMap<ExecutionKey, Arc<Mutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &ExecutionKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // entries nobody holds or waits on
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Clone)]
pub struct FlowService {
    registry: FlowRegistry,
    executor: FlowExecutor,
    store: Arc<dyn ExecutionStore>,
    audit: Arc<dyn AuditSink>,
    locks: KeyedLocks,
}

impl FlowService {
    pub fn new(
        registry: FlowRegistry,
        executor: FlowExecutor,
        store: Arc<dyn ExecutionStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            registry,
            executor,
            store,
            audit,
            locks: KeyedLocks::new(),
        }
    }

    pub fn registry(&self) -> &FlowRegistry {
        &self.registry
    }

    /// Run one pass for `key` and persist the result.
    ///
    /// The state is saved before audit entries are appended; a lost audit entry never
    /// undoes a transition.
    pub async fn advance(
        &self,
        key: &ExecutionKey,
        answer: Option<&Value>,
        now: DateTime<FixedOffset>,
    ) -> Result<Advance, FlowError> {
        let flow = self
            .registry
            .get(&key.flow_id)
            .await
            .ok_or_else(|| FlowError::FlowNotFound(key.flow_id.clone()))?;

        let _guard = self.locks.lock(key).await;
        let _lease = self.store.lease(key).await?;
        let state = self.store.load(key).await?;
        let mut outcome = self.executor.advance(&flow, &state, answer, now).await?;

        if outcome.state == state {
            return Ok(outcome);
        }
        outcome.state = self.store.save(&outcome.state).await?;

        for entry in &outcome.audit {
            self.audit.append(entry).await;
        }
        Ok(outcome)
    }

    /// Current state; NotStarted if the execution never ran
    pub async fn state(&self, key: &ExecutionKey) -> Result<ExecutionState, FlowError> {
        Ok(self.store.load(key).await?)
    }

    /// Return an execution to NotStarted, discarding its answers
    pub async fn reset(&self, key: &ExecutionKey) -> Result<ExecutionState, FlowError> {
        let _guard = self.locks.lock(key).await;
        let _lease = self.store.lease(key).await?;
        let state = self.store.load(key).await?;
        let saved = self.store.save(&state.reset()).await?;
        log::info!("Reset execution {} (was {})", key, state.status);
        Ok(saved)
    }

    pub async fn audit_trail(&self, key: &ExecutionKey) -> Result<Vec<AuditLogEntry>, FlowError> {
        self.audit
            .trail(key)
            .await
            .map_err(|e| FlowError::api("audit log", e.to_string()))
    }
}
