//! goms: declared tables, relations and state machines turned into a live multi-site data API.

pub mod action;
pub mod blueprint;
pub mod boot;
pub mod config;
pub mod error;
mod extractors;
pub mod handlers;
pub mod import;
pub mod migration;
pub mod registry;
pub mod response;
pub mod router;
pub mod routes;
pub mod schema;
pub mod service;
pub mod site;
pub mod sql;
pub mod state;
pub mod store;
pub mod tracking;

pub use action::{ActionEngine, ActionPerformer, PerformerSet};
pub use boot::{boot, Backends, BootReport, Booted};
pub use config::{load_from_dir, InitConfig, Settings};
pub use error::{AppError, BootError, BootStage, ConfigError};
pub use import::{spawn_import, ImportReport};
pub use registry::{Resource, ResourceRegistry};
pub use router::TenantRouter;
pub use routes::app_routes;
pub use schema::{ReconciliationConflict, RelationManager, UnifiedSchema};
pub use service::{CrudService, MemoryResourceStore, ResourceStore};
pub use site::SiteContext;
pub use state::AppState;
pub use store::ensure_database_exists;
pub use tracking::{EntityStateRecord, StateMachineManager};
