//! Route tables. Each function returns a stateless router; `app_routes` merges them all.

pub mod action;
pub mod common;
pub mod entity;
pub mod model;
pub mod site;
pub mod track;

pub use action::action_routes;
pub use common::common_routes;
pub use entity::entity_routes;
pub use model::model_routes;
pub use site::site_routes;
pub use track::track_routes;

use crate::state::AppState;
use axum::Router;

/// Full API surface shared by every site. Host dispatch is layered on top by `TenantRouter`.
pub fn app_routes(state: AppState) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(entity_routes(state.clone()))
        .merge(track_routes(state.clone()))
        .merge(action_routes(state.clone()))
        .merge(model_routes(state.clone()))
        .merge(site_routes(state))
}
