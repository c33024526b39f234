//! Action handlers. GET passes query parameters as input, POST passes the JSON body.

use crate::error::AppError;
use crate::handlers::entity::body_to_map;
use crate::response::{reply_list, reply_ok};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub async fn invoke_get(
    State(state): State<AppState>,
    Path((typename, action)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let input: Map<String, Value> = params.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
    let result = state.actions.invoke(&typename, &action, &input).await?;
    Ok(reply_ok(result))
}

/// An empty body is empty input; anything else must be a JSON object.
fn post_input(body: &[u8]) -> Result<Map<String, Value>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    let value: Value =
        serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("malformed JSON body: {}", e)))?;
    body_to_map(value)
}

pub async fn invoke_post(
    State(state): State<AppState>,
    Path((typename, action)): Path<(String, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let input = post_input(&body)?;
    let result = state.actions.invoke(&typename, &action, &input).await?;
    Ok(reply_ok(result))
}

/// GET /actions.
pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    let defs: Vec<_> = state.actions.definitions().cloned().collect();
    reply_list(defs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_empty_input() {
        assert!(post_input(b"").unwrap().is_empty());
        assert!(post_input(b" \n").unwrap().is_empty());
        assert_eq!(post_input(br#"{"email":"a@b.c"}"#).unwrap()["email"], "a@b.c");
    }

    #[test]
    fn malformed_or_non_object_bodies_are_bad_requests() {
        assert!(matches!(post_input(br#"{"email":"#), Err(AppError::BadRequest(_))));
        assert!(matches!(post_input(b"[1,2]"), Err(AppError::BadRequest(_))));
    }
}
