//! Starts tracking for entities and applies events against their machine's transition table.

use crate::config::StateMachineConfig;
use crate::error::{AppError, ConfigError};
use crate::tracking::description::StateMachineDescription;
use crate::tracking::store::{EntityStateRecord, StateStore, StoreError, TransitionEntry};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Re-reads after a lost version race before giving up with `Conflict`.
const MAX_EVENT_ATTEMPTS: usize = 8;

pub struct StateMachineManager {
    machines: HashMap<String, Arc<StateMachineDescription>>,
    by_entity_type: HashMap<String, String>,
    store: Arc<dyn StateStore>,
}

impl StateMachineManager {
    pub fn new(descriptions: Vec<StateMachineDescription>, store: Arc<dyn StateStore>) -> Self {
        let mut machines = HashMap::new();
        let mut by_entity_type = HashMap::new();
        for d in descriptions {
            by_entity_type.insert(d.entity_type.clone(), d.name.clone());
            machines.insert(d.name.clone(), Arc::new(d));
        }
        StateMachineManager {
            machines,
            by_entity_type,
            store,
        }
    }

    pub fn from_configs(configs: &[StateMachineConfig], store: Arc<dyn StateStore>) -> Result<Self, ConfigError> {
        let descriptions = configs
            .iter()
            .map(StateMachineDescription::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(descriptions, store))
    }

    pub fn description(&self, machine_id: &str) -> Result<&StateMachineDescription, AppError> {
        self.machines
            .get(machine_id)
            .map(|d| d.as_ref())
            .ok_or_else(|| AppError::NotFound(format!("state machine {}", machine_id)))
    }

    pub fn for_entity_type(&self, entity_type: &str) -> Option<&StateMachineDescription> {
        self.by_entity_type
            .get(entity_type)
            .and_then(|name| self.machines.get(name))
            .map(|d| d.as_ref())
    }

    pub fn descriptions(&self) -> impl Iterator<Item = &StateMachineDescription> {
        self.machines.values().map(|d| d.as_ref())
    }

    /// Begin tracking `entity_id` of `entity_type` in `initial_state`.
    pub async fn start(
        &self,
        entity_type: &str,
        entity_id: &str,
        initial_state: &str,
    ) -> Result<EntityStateRecord, AppError> {
        let machine = self
            .for_entity_type(entity_type)
            .ok_or_else(|| AppError::NotFound(format!("state machine for {}", entity_type)))?;
        self.begin(machine, entity_id, initial_state).await
    }

    /// Begin tracking under a named machine; the machine's initial state is used when none is given.
    pub async fn start_machine(
        &self,
        machine_id: &str,
        entity_id: &str,
        initial_state: Option<&str>,
    ) -> Result<EntityStateRecord, AppError> {
        let machine = self.description(machine_id)?;
        let state = initial_state.unwrap_or_else(|| machine.initial_state());
        self.begin(machine, entity_id, state).await
    }

    async fn begin(
        &self,
        machine: &StateMachineDescription,
        entity_id: &str,
        state: &str,
    ) -> Result<EntityStateRecord, AppError> {
        if !machine.has_state(state) {
            return Err(AppError::InvalidState {
                entity_type: machine.entity_type.clone(),
                state: state.to_string(),
            });
        }
        let record = EntityStateRecord::new(&machine.name, &machine.entity_type, entity_id, state);
        self.store.insert(&record).await?;
        tracing::info!(machine = %machine.name, entity_id = %entity_id, state = %state, "tracking started");
        Ok(record)
    }

    pub async fn record(&self, state_id: Uuid) -> Result<EntityStateRecord, AppError> {
        Ok(self.store.load(state_id).await?)
    }

    /// Apply `event` to the record. An undefined (state, event) pair leaves the record untouched.
    pub async fn apply_event(&self, state_id: Uuid, event: &str) -> Result<EntityStateRecord, AppError> {
        self.apply(state_id, event, None).await
    }

    /// As `apply_event`, but the record must belong to `entity_type`.
    pub async fn apply_event_for(
        &self,
        entity_type: &str,
        state_id: Uuid,
        event: &str,
    ) -> Result<EntityStateRecord, AppError> {
        self.apply(state_id, event, Some(entity_type)).await
    }

    async fn apply(
        &self,
        state_id: Uuid,
        event: &str,
        entity_type: Option<&str>,
    ) -> Result<EntityStateRecord, AppError> {
        for attempt in 1..=MAX_EVENT_ATTEMPTS {
            let mut record = self.store.load(state_id).await?;
            if let Some(expected) = entity_type {
                if record.entity_type != expected {
                    return Err(AppError::NotFound(format!("{} state {}", expected, state_id)));
                }
            }
            let machine = self.description(&record.machine_id).map_err(|_| {
                AppError::Store(format!("record {} references unknown machine {}", state_id, record.machine_id))
            })?;
            let invalid = || AppError::InvalidTransition {
                state: record.current_state.clone(),
                event: event.to_string(),
            };
            let from = machine.state(&record.current_state).ok_or_else(|| AppError::InvalidState {
                entity_type: record.entity_type.clone(),
                state: record.current_state.clone(),
            })?;
            let ev = machine.event(event).ok_or_else(invalid)?;
            let to = machine.next(from, ev).ok_or_else(invalid)?;

            let entry = TransitionEntry {
                from: record.current_state.clone(),
                event: event.to_string(),
                to: machine.state_name(to).to_string(),
                at: Utc::now(),
            };
            match self.store.commit_transition(state_id, record.version, &entry).await {
                Ok(version) => {
                    tracing::info!(
                        state_id = %state_id,
                        from = %entry.from,
                        event = %entry.event,
                        to = %entry.to,
                        "transition applied"
                    );
                    record.current_state = entry.to.clone();
                    record.version = version;
                    record.history.push(entry);
                    return Ok(record);
                }
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(state_id = %state_id, attempt, "transition lost a version race, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(AppError::Conflict(format!(
            "state record {} kept changing while applying {}",
            state_id, event
        )))
    }
}
