//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Declarative input that can never be materialized. Raised while loading config, before boot.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid identifier for {kind}: '{name}'")]
    InvalidIdentifier { kind: &'static str, name: String },
    #[error("state machine '{machine}': unknown {kind} '{name}'")]
    UnknownStateMachineKey {
        machine: String,
        kind: &'static str,
        name: String,
    },
    #[error("state machine '{machine}': event '{event}' from '{state}' has conflicting targets")]
    AmbiguousTransition {
        machine: String,
        state: String,
        event: String,
    },
    #[error("entity type '{entity_type}' already has state machine '{existing}'")]
    DuplicateStateMachine { entity_type: String, existing: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("invalid state '{state}' for {entity_type}")]
    InvalidState { entity_type: String, state: String },
    #[error("event '{event}' is not allowed from state '{state}'")]
    InvalidTransition { state: String, event: String },
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("state store: {0}")]
    Store(String),
    #[error("action '{action}' failed: {message}")]
    ActionFailed { action: String, message: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

/// Boot pipeline stages, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootStage {
    Validate,
    Catalog,
    Introspect,
    Reconcile,
    Materialize,
    Persist,
    Registry,
    Tracking,
    Actions,
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootStage::Validate => "validate",
            BootStage::Catalog => "catalog",
            BootStage::Introspect => "introspect",
            BootStage::Reconcile => "reconcile",
            BootStage::Materialize => "materialize",
            BootStage::Persist => "persist",
            BootStage::Registry => "registry",
            BootStage::Tracking => "tracking",
            BootStage::Actions => "actions",
        };
        f.write_str(name)
    }
}

/// Fatal initialization failure. The listener must not start.
#[derive(Error, Debug)]
#[error("boot failed at stage {stage}: {source}")]
pub struct BootError {
    pub stage: BootStage,
    #[source]
    pub source: AppError,
}

impl BootError {
    pub fn at(stage: BootStage) -> impl FnOnce(AppError) -> BootError {
        move |source| BootError { stage, source }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::InvalidState { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_state"),
            AppError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
            AppError::ActionFailed { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "action_failed"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
