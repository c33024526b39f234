//! Schema model, reconciliation, relation expansion and catalog round-trip.

pub mod catalog;
pub mod model;
pub mod reconcile;
pub mod relation;

pub use catalog::{from_entries, introspect, to_entries, Catalog, CatalogEntries, MemoryCatalog};
pub use model::*;
pub use reconcile::{reconcile, Reconciliation, ReconciliationConflict};
pub use relation::{join_columns, ForeignKey, RelationManager};
