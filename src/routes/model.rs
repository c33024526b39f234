use crate::handlers::model::{blueprint, js_model};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn model_routes(state: AppState) -> Router {
    Router::new()
        .route("/jsmodel/:typename", get(js_model))
        .route("/apiblueprint.json", get(blueprint))
        .with_state(state)
}
