use crate::handlers::track::{current, event, start};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn track_routes(state: AppState) -> Router {
    Router::new()
        .route("/track/start/:machine_id", post(start))
        .route("/track/event/:typename/:state_id/:event_name", post(event))
        .route("/track/state/:state_id", get(current))
        .with_state(state)
}
