//! Per-entity-type transition tables with states and events resolved to ids at load time.

use crate::config::StateMachineConfig;
use crate::error::ConfigError;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(u16);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u16);

#[derive(Clone, Debug)]
pub struct StateMachineDescription {
    pub name: String,
    pub label: Option<String>,
    pub entity_type: String,
    initial: StateId,
    states: Vec<String>,
    events: Vec<String>,
    transitions: HashMap<(StateId, EventId), StateId>,
}

fn intern(names: &mut Vec<String>, name: &str) -> Result<u16, ConfigError> {
    if let Some(i) = names.iter().position(|n| n == name) {
        return Ok(i as u16);
    }
    let next = u16::try_from(names.len())
        .map_err(|_| ConfigError::Validation(format!("too many names at '{}'", name)))?;
    names.push(name.to_string());
    Ok(next)
}

impl StateMachineDescription {
    /// Build the transition table. Unknown states, an unknown initial state and two edges
    /// leaving the same state on the same event for different targets are rejected.
    pub fn from_config(config: &StateMachineConfig) -> Result<Self, ConfigError> {
        let unknown = |kind: &'static str, name: &str| ConfigError::UnknownStateMachineKey {
            machine: config.name.clone(),
            kind,
            name: name.to_string(),
        };

        let mut states = Vec::new();
        for s in &config.states {
            if s.trim().is_empty() {
                return Err(unknown("state", s));
            }
            if states.contains(s) {
                return Err(ConfigError::Validation(format!(
                    "state machine {} lists state {} twice",
                    config.name, s
                )));
            }
            intern(&mut states, s)?;
        }
        let state_id = |name: &str| {
            states
                .iter()
                .position(|s| s == name)
                .map(|i| StateId(i as u16))
                .ok_or_else(|| unknown("state", name))
        };
        let initial = state_id(&config.initial_state)?;

        let mut events = Vec::new();
        let mut transitions = HashMap::new();
        for ev in &config.events {
            if ev.name.trim().is_empty() {
                return Err(unknown("event", &ev.name));
            }
            let event = EventId(intern(&mut events, &ev.name)?);
            let dst = state_id(&ev.dst)?;
            for src in &ev.src {
                let src = state_id(src)?;
                match transitions.insert((src, event), dst) {
                    Some(previous) if previous != dst => {
                        return Err(ConfigError::AmbiguousTransition {
                            machine: config.name.clone(),
                            state: states[src.0 as usize].clone(),
                            event: ev.name.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }

        Ok(StateMachineDescription {
            name: config.name.clone(),
            label: config.label.clone(),
            entity_type: config.entity_type.clone(),
            initial,
            states,
            events,
            transitions,
        })
    }

    pub fn state(&self, name: &str) -> Option<StateId> {
        self.states.iter().position(|s| s == name).map(|i| StateId(i as u16))
    }

    pub fn event(&self, name: &str) -> Option<EventId> {
        self.events.iter().position(|e| e == name).map(|i| EventId(i as u16))
    }

    pub fn state_name(&self, id: StateId) -> &str {
        &self.states[id.0 as usize]
    }

    pub fn event_name(&self, id: EventId) -> &str {
        &self.events[id.0 as usize]
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.state(name).is_some()
    }

    pub fn initial_state(&self) -> &str {
        self.state_name(self.initial)
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn next(&self, state: StateId, event: EventId) -> Option<StateId> {
        self.transitions.get(&(state, event)).copied()
    }

    /// No event leaves this state.
    pub fn is_terminal(&self, state: StateId) -> bool {
        !self.transitions.keys().any(|(from, _)| *from == state)
    }

    /// Events that can be applied from `state`, sorted by declaration order.
    pub fn available_events(&self, state: StateId) -> Vec<&str> {
        let mut ids: Vec<EventId> = self
            .transitions
            .keys()
            .filter(|(from, _)| *from == state)
            .map(|(_, ev)| *ev)
            .collect();
        ids.sort();
        ids.dedup();
        ids.into_iter().map(|e| self.event_name(e)).collect()
    }
}
