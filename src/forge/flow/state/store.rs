// SPDX-License-Identifier: MIT

//! Execution-state persistence
//!
//! Stores follow a read-modify-write pattern with an optimistic version check: `save`
//! succeeds only if the stored version still equals the version the caller loaded.
//! A lease keeps the whole cycle exclusive for one key, including any side effects
//! performed between `load` and `save`.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::schema::{ExecutionKey, ExecutionState};
use crate::kit::error::StoreError;

/// Exclusive hold on one execution; released on drop
#[must_use = "the lease is released as soon as it is dropped"]
pub struct ExecutionLease {
    _held: Option<Box<dyn Send + Sync>>,
}

impl ExecutionLease {
    /// A lease for stores whose exclusion is already covered in-process
    pub fn unguarded() -> Self {
        Self { _held: None }
    }

    fn holding(guard: impl Send + Sync + 'static) -> Self {
        Self {
            _held: Some(Box::new(guard)),
        }
    }
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Current state, or a fresh NotStarted state if nothing was saved yet
    async fn load(&self, key: &ExecutionKey) -> Result<ExecutionState, StoreError>;

    /// Persist `state` and return it with its new version
    async fn save(&self, state: &ExecutionState) -> Result<ExecutionState, StoreError>;

    /// Exclude other holders of this key, including other processes sharing the store.
    ///
    /// Process-local stores rely on the caller's in-process locking.
    async fn lease(&self, _key: &ExecutionKey) -> Result<ExecutionLease, StoreError> {
        Ok(ExecutionLease::unguarded())
    }
}

fn next_version(
    key: &ExecutionKey,
    stored: Option<&ExecutionState>,
    state: &ExecutionState,
) -> Result<ExecutionState, StoreError> {
    let found = stored.map_or(0, |s| s.version);
    if found != state.version {
        return Err(StoreError::Conflict {
            key: key.to_string(),
            expected: state.version,
            found,
        });
    }
    let mut saved = state.clone();
    saved.version = found + 1;
    saved.updated_at = Some(Utc::now());
    Ok(saved)
}

/// Process-local store
#[derive(Clone, Default)]
pub struct InMemoryExecutionStore {
    states: Arc<RwLock<HashMap<ExecutionKey, ExecutionState>>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn load(&self, key: &ExecutionKey) -> Result<ExecutionState, StoreError> {
        let states = self.states.read().await;
        Ok(states
            .get(key)
            .cloned()
            .unwrap_or_else(|| ExecutionState::new(key)))
    }

    async fn save(&self, state: &ExecutionState) -> Result<ExecutionState, StoreError> {
        let key = state.key();
        let mut states = self.states.write().await;
        let saved = next_version(&key, states.get(&key), state)?;
        states.insert(key, saved.clone());
        Ok(saved)
    }
}

const LOCK_POLL: Duration = Duration::from_millis(20);
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(300);

/// A lock file created with `create_new`; removed on drop
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    async fn acquire(
        path: PathBuf,
        key: &ExecutionKey,
        timeout: Duration,
        stale_after: Duration,
    ) -> Result<Self, StoreError> {
        let started = Instant::now();
        loop {
            let created = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match created {
                Ok(mut file) => {
                    let lock = Self { path };
                    file.write_all(std::process::id().to_string().as_bytes())
                        .await?;
                    return Ok(lock);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(&path, stale_after).await {
                        log::warn!("Breaking stale lock {}", path.display());
                        if let Err(e) = tokio::fs::remove_file(&path).await {
                            log::debug!("Stale lock {} already gone: {}", path.display(), e);
                        }
                        continue;
                    }
                    if started.elapsed() >= timeout {
                        return Err(StoreError::Locked {
                            key: key.to_string(),
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    tokio::time::sleep(LOCK_POLL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                log::warn!("Could not release lock {}: {}", self.path.display(), e);
            }
        }
    }
}

async fn is_stale(path: &Path, stale_after: Duration) -> bool {
    tokio::fs::metadata(path)
        .await
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|age| age >= stale_after)
}

/// One pretty-printed JSON document per execution under a directory.
///
/// Safe to share between processes: `lease` takes a `<key>.lease` file for a whole pass
/// and every `save` takes a `<key>.lock` file around its version check and write.
#[derive(Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
    lock_timeout: Duration,
    stale_after: Duration,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    /// How long `lease` and `save` wait for another holder before giving up
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Age after which a lock file is assumed to belong to a crashed holder
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &ExecutionKey, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key.file_stem(), extension))
    }

    async fn lock_file(&self, key: &ExecutionKey, extension: &str) -> Result<LockFile, StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        LockFile::acquire(
            self.path_for(key, extension),
            key,
            self.lock_timeout,
            self.stale_after,
        )
        .await
    }

    async fn read(&self, key: &ExecutionKey) -> Result<Option<ExecutionState>, StoreError> {
        let content = match tokio::fs::read_to_string(self.path_for(key, "json")).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state: ExecutionState = serde_json::from_str(&content)?;
        if state.key() != *key {
            return Err(StoreError::KeyMismatch {
                requested: key.to_string(),
                found: state.key().to_string(),
            });
        }
        Ok(Some(state))
    }
}

#[async_trait]
impl ExecutionStore for JsonFileStore {
    async fn load(&self, key: &ExecutionKey) -> Result<ExecutionState, StoreError> {
        Ok(self
            .read(key)
            .await?
            .unwrap_or_else(|| ExecutionState::new(key)))
    }

    async fn save(&self, state: &ExecutionState) -> Result<ExecutionState, StoreError> {
        let key = state.key();
        let _lock = self.lock_file(&key, "lock").await?;

        let stored = self.read(&key).await?;
        let saved = next_version(&key, stored.as_ref(), state)?;

        let path = self.path_for(&key, "json");
        let tmp = self.path_for(&key, "json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(&saved)?).await?;
        tokio::fs::rename(&tmp, &path).await?;

        log::debug!("Saved execution {} at version {}", key, saved.version);
        Ok(saved)
    }

    async fn lease(&self, key: &ExecutionKey) -> Result<ExecutionLease, StoreError> {
        let lock = self.lock_file(key, "lease").await?;
        Ok(ExecutionLease::holding(lock))
    }
}
