//! Site content read/write for the routed site.

use crate::error::AppError;
use crate::response::reply_ok;
use crate::site::SiteContext;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ContentQuery {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct ContentBody {
    pub path: String,
    pub content: String,
}

#[derive(Serialize)]
struct ContentView {
    site: String,
    path: String,
    content: String,
}

fn check_path(path: &str) -> Result<(), AppError> {
    if path.trim().is_empty() {
        return Err(AppError::BadRequest("path is required".into()));
    }
    Ok(())
}

pub async fn get_content(
    State(state): State<AppState>,
    site: SiteContext,
    Query(q): Query<ContentQuery>,
) -> Result<impl IntoResponse, AppError> {
    check_path(&q.path)?;
    let content = state
        .content
        .get(&site.name, &q.path)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("content {} on site {}", q.path, site.name)))?;
    Ok(reply_ok(ContentView {
        site: site.name,
        path: q.path,
        content,
    }))
}

pub async fn save_content(
    State(state): State<AppState>,
    site: SiteContext,
    Json(body): Json<ContentBody>,
) -> Result<impl IntoResponse, AppError> {
    check_path(&body.path)?;
    state.content.put(&site.name, &body.path, &body.content).await?;
    tracing::info!(site = %site.name, path = %body.path, "site content saved");
    Ok(reply_ok(ContentView {
        site: site.name,
        path: body.path,
        content: body.content,
    }))
}
