//! Shared application state for all routes. Everything here is built once at boot.

use crate::action::ActionEngine;
use crate::registry::ResourceRegistry;
use crate::schema::UnifiedSchema;
use crate::service::ResourceStore;
use crate::site::SiteContentStore;
use crate::tracking::StateMachineManager;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub schema: Arc<UnifiedSchema>,
    pub registry: Arc<ResourceRegistry>,
    pub rows: Arc<dyn ResourceStore>,
    pub machines: Arc<StateMachineManager>,
    pub actions: Arc<ActionEngine>,
    pub content: Arc<dyn SiteContentStore>,
}
