//! State tracking handlers: start, event, state.

use crate::error::AppError;
use crate::response::{reply_created, reply_ok};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBody {
    pub reference_id: serde_json::Value,
    #[serde(default)]
    pub initial_state: Option<String>,
}

fn parse_state_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("invalid state id".into()))
}

fn reference_text(v: &serde_json::Value) -> Result<String, AppError> {
    match v {
        serde_json::Value::String(s) if !s.is_empty() => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        _ => Err(AppError::BadRequest("referenceId must be a string or number".into())),
    }
}

/// Text form of a parsed key, so every spelling of one row tracks under the same entity id.
fn canonical_entity_id(id: &serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// POST /track/start/{stateMachineId}. The referenced row must exist.
pub async fn start(
    State(state): State<AppState>,
    Path(machine_id): Path<String>,
    Json(body): Json<StartBody>,
) -> Result<impl IntoResponse, AppError> {
    let machine = state.machines.description(&machine_id)?;
    let resource = state.registry.get(&machine.entity_type)?;
    let reference = reference_text(&body.reference_id)?;
    let id = resource.pk_type.parse(&reference)?;
    state
        .rows
        .read(resource, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {}", resource.name, reference)))?;
    let record = state
        .machines
        .start_machine(&machine_id, &canonical_entity_id(&id), body.initial_state.as_deref())
        .await?;
    Ok(reply_created(record))
}

/// POST /track/event/{typename}/{objectStateId}/{eventName}.
pub async fn event(
    State(state): State<AppState>,
    Path((typename, state_id, event_name)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_state_id(&state_id)?;
    let record = state.machines.apply_event_for(&typename, id, &event_name).await?;
    Ok(reply_ok(record))
}

/// GET /track/state/{objectStateId}.
pub async fn current(
    State(state): State<AppState>,
    Path(state_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_state_id(&state_id)?;
    let record = state.machines.record(id).await?;
    Ok(reply_ok(record))
}
