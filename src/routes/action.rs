use crate::handlers::action::{invoke_get, invoke_post, list};
use crate::state::AppState;
use axum::{routing::get, Router};

/// GET /actions and GET/POST /action/{typename}/{actionName}.
pub fn action_routes(state: AppState) -> Router {
    Router::new()
        .route("/actions", get(list))
        .route("/action/:typename/:action", get(invoke_get).post(invoke_post))
        .with_state(state)
}
