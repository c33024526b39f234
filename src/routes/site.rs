use crate::handlers::site::{get_content, save_content};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn site_routes(state: AppState) -> Router {
    Router::new()
        .route("/site/content", get(get_content).post(save_content))
        .with_state(state)
}
