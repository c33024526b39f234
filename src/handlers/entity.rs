//! Generic resource handlers: list, create, read, update, delete.

use crate::error::AppError;
use crate::registry::Resource;
use crate::response::{reply_created, reply_list, reply_ok};
use crate::service::{ListQuery, RequestValidator};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub(crate) fn body_to_map(value: Value) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

fn list_query(resource: &Resource, params: HashMap<String, String>) -> Result<ListQuery, AppError> {
    let mut query = ListQuery::default();
    for (k, v) in params {
        match k.as_str() {
            "limit" => {
                query.limit = Some(v.parse().map_err(|_| AppError::BadRequest("invalid limit".into()))?);
            }
            "offset" => {
                query.offset = Some(v.parse().map_err(|_| AppError::BadRequest("invalid offset".into()))?);
            }
            "include" => {
                query.include = v
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
            _ => {
                if let Some(column) = resource.column(&k) {
                    let value = RequestValidator::filter_value(column, &v)?;
                    query.filters.push((k, value));
                }
            }
        }
    }
    query.filters.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(query)
}

pub async fn list(
    State(state): State<AppState>,
    Path(typename): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let resource = state.registry.get(&typename)?;
    let query = list_query(resource, params)?;
    let rows = state.rows.list(&state.registry, resource, &query).await?;
    Ok(reply_list(rows))
}

pub async fn create(
    State(state): State<AppState>,
    Path(typename): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let resource = state.registry.get(&typename)?;
    let body = body_to_map(body)?;
    RequestValidator::validate_create(resource, &body)?;
    let row = state.rows.create(resource, &body).await?;
    Ok(reply_created(row))
}

pub async fn read(
    State(state): State<AppState>,
    Path((typename, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let resource = state.registry.get(&typename)?;
    let id = resource.pk_type.parse(&id_str)?;
    let row = state
        .rows
        .read(resource, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {}", typename, id_str)))?;
    Ok(reply_ok(row))
}

pub async fn update(
    State(state): State<AppState>,
    Path((typename, id_str)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let resource = state.registry.get(&typename)?;
    let id = resource.pk_type.parse(&id_str)?;
    let body = body_to_map(body)?;
    RequestValidator::validate_update(resource, &body)?;
    let row = state
        .rows
        .update(resource, &id, &body)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {}", typename, id_str)))?;
    Ok(reply_ok(row))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((typename, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let resource = state.registry.get(&typename)?;
    let id = resource.pk_type.parse(&id_str)?;
    state
        .rows
        .delete(resource, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {}", typename, id_str)))?;
    Ok(StatusCode::NO_CONTENT)
}
