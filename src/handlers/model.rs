//! Schema exposure for client code generation.

use crate::blueprint::{api_blueprint, type_model};
use crate::error::AppError;
use crate::response::reply_ok;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

/// GET /jsmodel/{typename}.
pub async fn js_model(
    State(state): State<AppState>,
    Path(typename): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let resource = state.registry.get(&typename)?;
    Ok(reply_ok(type_model(resource, &state.machines, &state.actions)))
}

/// GET /apiblueprint.json.
pub async fn blueprint(State(state): State<AppState>) -> impl IntoResponse {
    Json(api_blueprint(&state.registry))
}
