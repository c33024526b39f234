//! Named actions per entity type, dispatched to registered performers.

pub mod builtin;
mod engine;

pub use builtin::{DataExportPerformer, RowCreatePerformer};
pub use engine::{ActionContext, ActionDefinition, ActionEngine, ActionPerformer, PerformerSet};
