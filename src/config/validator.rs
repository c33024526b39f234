//! Config validation: identifiers, per-table consistency, state machine tables.

use crate::config::InitConfig;
use crate::error::ConfigError;
use crate::tracking::StateMachineDescription;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Table, column, state machine and action names end up in SQL and URLs.
pub fn is_identifier(name: &str) -> bool {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT
        .get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("static regex"))
        .is_match(name)
}

fn check_identifier(kind: &'static str, name: &str) -> Result<(), ConfigError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier {
            kind,
            name: name.to_string(),
        })
    }
}

pub fn validate(config: &InitConfig) -> Result<(), ConfigError> {
    for t in &config.tables {
        check_identifier("table", &t.name)?;
        let mut seen = HashSet::new();
        for c in &t.columns {
            check_identifier("column", &c.name)?;
            if !seen.insert(c.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "table {} declares column {} twice",
                    t.name, c.name
                )));
            }
        }
        for r in &t.relations {
            check_identifier("relation target", &r.target)?;
        }
        for set in &t.unique {
            if set.is_empty() {
                return Err(ConfigError::Validation(format!("table {} has an empty unique set", t.name)));
            }
            for col in set {
                check_identifier("column", col)?;
            }
        }
    }

    let mut machine_by_type: HashMap<&str, &str> = HashMap::new();
    let mut machine_names = HashSet::new();
    for sm in &config.state_machines {
        check_identifier("state machine", &sm.name)?;
        check_identifier("entity type", &sm.entity_type)?;
        if !machine_names.insert(sm.name.as_str()) {
            return Err(ConfigError::Validation(format!("state machine {} declared twice", sm.name)));
        }
        if let Some(existing) = machine_by_type.insert(sm.entity_type.as_str(), sm.name.as_str()) {
            return Err(ConfigError::DuplicateStateMachine {
                entity_type: sm.entity_type.clone(),
                existing: existing.to_string(),
            });
        }
        StateMachineDescription::from_config(sm)?;
    }

    let mut action_keys = HashSet::new();
    for a in &config.actions {
        check_identifier("entity type", &a.entity_type)?;
        check_identifier("action", &a.name)?;
        if !action_keys.insert((a.entity_type.as_str(), a.name.as_str())) {
            return Err(ConfigError::Validation(format!(
                "action {}/{} declared twice",
                a.entity_type, a.name
            )));
        }
        for f in &a.input_fields {
            check_identifier("action field", &f.name)?;
        }
    }

    let mut hosts = HashSet::new();
    for s in &config.sites {
        if s.hostname.trim().is_empty() {
            return Err(ConfigError::Validation(format!("site {} has no hostname", s.name)));
        }
        if !hosts.insert(s.hostname.to_ascii_lowercase()) {
            return Err(ConfigError::Validation(format!("hostname {} mapped twice", s.hostname)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EventConfig, StateMachineConfig, TableConfig};

    fn machine(name: &str, entity_type: &str) -> StateMachineConfig {
        StateMachineConfig {
            name: name.into(),
            label: None,
            entity_type: entity_type.into(),
            initial_state: "new".into(),
            states: vec!["new".into(), "paid".into()],
            events: vec![EventConfig {
                name: "pay".into(),
                label: None,
                src: vec!["new".into()],
                dst: "paid".into(),
            }],
        }
    }

    #[test]
    fn identifiers_are_lowercase_sql_safe() {
        assert!(is_identifier("order"));
        assert!(is_identifier("user_user_id_has_usergroup_usergroup_id"));
        assert!(!is_identifier("Order"));
        assert!(!is_identifier("drop table;"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn rejects_bad_table_name() {
        let config = InitConfig {
            tables: vec![TableConfig {
                name: "bad name".into(),
                columns: vec![],
                relations: vec![],
                unique: vec![],
            }],
            ..Default::default()
        };
        assert!(matches!(validate(&config), Err(ConfigError::InvalidIdentifier { kind: "table", .. })));
    }

    #[test]
    fn one_state_machine_per_entity_type() {
        let config = InitConfig {
            state_machines: vec![machine("order_flow", "order"), machine("order_flow_2", "order")],
            ..Default::default()
        };
        assert!(matches!(validate(&config), Err(ConfigError::DuplicateStateMachine { .. })));
    }

    #[test]
    fn state_machine_keys_checked_at_load() {
        let mut sm = machine("order_flow", "order");
        sm.events[0].dst = "refunded".into();
        let config = InitConfig {
            state_machines: vec![sm],
            ..Default::default()
        };
        assert!(matches!(validate(&config), Err(ConfigError::UnknownStateMachineKey { .. })));
    }
}
