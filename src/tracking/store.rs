//! Durable per-entity state records with an optimistic `version` check on every transition.

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

/// One applied transition. Never modified once recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransitionEntry {
    pub from: String,
    pub event: String,
    pub to: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntityStateRecord {
    pub id: Uuid,
    pub machine_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub current_state: String,
    /// Number of transitions applied so far.
    pub version: i64,
    pub history: Vec<TransitionEntry>,
    pub created_at: DateTime<Utc>,
}

impl EntityStateRecord {
    pub fn new(machine_id: &str, entity_type: &str, entity_id: &str, state: &str) -> Self {
        EntityStateRecord {
            id: Uuid::new_v4(),
            machine_id: machine_id.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            current_state: state.to_string(),
            version: 0,
            history: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The record moved past `expected_version` before this write landed.
    #[error("state record {id} changed concurrently (expected version {expected_version})")]
    Conflict { id: Uuid, expected_version: i64 },
    #[error("entity {entity_id} is already tracked by {machine_id}")]
    AlreadyTracked { machine_id: String, entity_id: String },
    #[error("state record {0} not found")]
    NotFound(Uuid),
    #[error("{0}")]
    Backend(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { .. } | StoreError::AlreadyTracked { .. } => AppError::Conflict(e.to_string()),
            StoreError::NotFound(_) => AppError::NotFound(e.to_string()),
            StoreError::Backend(msg) => AppError::Store(msg),
        }
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Insert a fresh record. At most one record per (machine, entity).
    async fn insert(&self, record: &EntityStateRecord) -> Result<(), StoreError>;

    async fn load(&self, id: Uuid) -> Result<EntityStateRecord, StoreError>;

    async fn find(&self, machine_id: &str, entity_id: &str) -> Result<Option<EntityStateRecord>, StoreError>;

    /// Move the record to `entry.to` and append `entry`, only if it is still at
    /// `expected_version`. Both changes land together or not at all. Returns the new version.
    async fn commit_transition(
        &self,
        id: Uuid,
        expected_version: i64,
        entry: &TransitionEntry,
    ) -> Result<i64, StoreError>;
}

/// Process-local store; records vanish with the process.
#[derive(Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<Uuid, EntityStateRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, EntityStateRecord>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Backend("state store lock poisoned".into()))
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn insert(&self, record: &EntityStateRecord) -> Result<(), StoreError> {
        let mut records = self.lock()?;
        if records
            .values()
            .any(|r| r.machine_id == record.machine_id && r.entity_id == record.entity_id)
        {
            return Err(StoreError::AlreadyTracked {
                machine_id: record.machine_id.clone(),
                entity_id: record.entity_id.clone(),
            });
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<EntityStateRecord, StoreError> {
        self.lock()?.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn find(&self, machine_id: &str, entity_id: &str) -> Result<Option<EntityStateRecord>, StoreError> {
        Ok(self
            .lock()?
            .values()
            .find(|r| r.machine_id == machine_id && r.entity_id == entity_id)
            .cloned())
    }

    async fn commit_transition(
        &self,
        id: Uuid,
        expected_version: i64,
        entry: &TransitionEntry,
    ) -> Result<i64, StoreError> {
        let mut records = self.lock()?;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if record.version != expected_version || record.current_state != entry.from {
            return Err(StoreError::Conflict { id, expected_version });
        }
        record.current_state = entry.to.clone();
        record.history.push(entry.clone());
        record.version += 1;
        Ok(record.version)
    }
}
