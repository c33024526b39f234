//! Per-entity lifecycle tracking: transition tables, durable state records, event application.

pub mod description;
pub mod manager;
pub mod pg;
pub mod store;

pub use description::{EventId, StateId, StateMachineDescription};
pub use manager::StateMachineManager;
pub use pg::PgStateStore;
pub use store::{EntityStateRecord, MemoryStateStore, StateStore, StoreError, TransitionEntry};
