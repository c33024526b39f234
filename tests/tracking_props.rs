//! State tracking properties: the record only ever follows the transition table, and terminal
//! states absorb every event.

use goms::config::{EventConfig, StateMachineConfig};
use goms::tracking::{MemoryStateStore, StateMachineDescription, StateMachineManager};
use goms::AppError;
use proptest::prelude::*;
use std::sync::Arc;

const EVENTS: &[&str] = &["pay", "ship", "deliver", "cancel", "refund", "bogus"];

fn event(name: &str, src: &[&str], dst: &str) -> EventConfig {
    EventConfig {
        name: name.into(),
        label: None,
        src: src.iter().map(|s| s.to_string()).collect(),
        dst: dst.into(),
    }
}

fn config() -> StateMachineConfig {
    StateMachineConfig {
        name: "order_flow".into(),
        label: None,
        entity_type: "order".into(),
        initial_state: "new".into(),
        states: ["new", "paid", "shipped", "delivered", "cancelled", "refunded"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        events: vec![
            event("pay", &["new"], "paid"),
            event("ship", &["paid"], "shipped"),
            event("deliver", &["shipped"], "delivered"),
            event("cancel", &["new", "paid"], "cancelled"),
            event("refund", &["cancelled"], "refunded"),
            event("refund", &["paid"], "refunded"),
        ],
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn record_follows_the_transition_table(events in prop::collection::vec(prop::sample::select(EVENTS), 0..12)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let description = StateMachineDescription::from_config(&config()).unwrap();
        let manager = StateMachineManager::new(vec![description.clone()], Arc::new(MemoryStateStore::new()));
        rt.block_on(async {
            let mut record = manager.start("order", "1", "new").await.unwrap();
            for name in events {
                let from = description.state(&record.current_state).unwrap();
                let expected = description.event(name).and_then(|e| description.next(from, e));
                match (manager.apply_event(record.id, name).await, expected) {
                    (Ok(next), Some(to)) => {
                        prop_assert_eq!(next.current_state.as_str(), description.state_name(to));
                        prop_assert_eq!(next.history.len(), record.history.len() + 1);
                        record = next;
                    }
                    (Err(AppError::InvalidTransition { .. }), None) => {
                        let unchanged = manager.record(record.id).await.unwrap();
                        prop_assert_eq!(&unchanged, &record);
                    }
                    (other, expected) => {
                        prop_assert!(false, "unexpected outcome {:?} for expected {:?}", other.map(|r| r.current_state), expected);
                    }
                }
                prop_assert!(description.has_state(&record.current_state));
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn terminal_states_absorb_every_event(events in prop::collection::vec(prop::sample::select(EVENTS), 1..6)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let description = StateMachineDescription::from_config(&config()).unwrap();
        let manager = StateMachineManager::new(vec![description.clone()], Arc::new(MemoryStateStore::new()));
        rt.block_on(async {
            for (i, terminal) in ["delivered", "refunded"].iter().enumerate() {
                let id = description.state(terminal).unwrap();
                prop_assert!(description.is_terminal(id));
                let record = manager.start("order", &i.to_string(), terminal).await.unwrap();
                for name in &events {
                    let is_invalid = matches!(
                        manager.apply_event(record.id, name).await,
                        Err(AppError::InvalidTransition { .. })
                    );
                    prop_assert!(is_invalid);
                }
                prop_assert_eq!(manager.record(record.id).await.unwrap().current_state, terminal.to_string());
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
