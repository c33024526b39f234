//! Generic CRUD routes. The path segment names the resource; handlers resolve it in the registry.

use crate::handlers::entity::{create, delete, list, read, update};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/:typename", get(list).post(create))
        .route("/api/:typename/:id", get(read).patch(update).delete(delete))
        .with_state(state)
}
