//! Sites: host-addressable contexts over the shared dataset, plus their stored content.

use crate::error::AppError;
use crate::store::{get_site_content, put_site_content};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;

pub const DEFAULT_SITE: &str = "default";

/// The site a request was routed to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SiteContext {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl SiteContext {
    pub fn new(name: impl Into<String>, hostname: Option<String>) -> Self {
        SiteContext {
            name: name.into(),
            hostname,
        }
    }

    pub fn default_site() -> Self {
        SiteContext::new(DEFAULT_SITE, None)
    }
}

/// Content documents keyed by (site, path).
#[async_trait]
pub trait SiteContentStore: Send + Sync {
    async fn get(&self, site: &str, path: &str) -> Result<Option<String>, AppError>;
    async fn put(&self, site: &str, path: &str, content: &str) -> Result<(), AppError>;
}

/// Stored in `_site_content`.
#[derive(Clone)]
pub struct PgSiteContent {
    pool: PgPool,
}

impl PgSiteContent {
    pub fn new(pool: PgPool) -> Self {
        PgSiteContent { pool }
    }
}

#[async_trait]
impl SiteContentStore for PgSiteContent {
    async fn get(&self, site: &str, path: &str) -> Result<Option<String>, AppError> {
        get_site_content(&self.pool, site, path).await
    }

    async fn put(&self, site: &str, path: &str, content: &str) -> Result<(), AppError> {
        put_site_content(&self.pool, site, path, content).await
    }
}

#[derive(Default)]
pub struct MemorySiteContent {
    docs: Mutex<HashMap<(String, String), String>>,
}

impl MemorySiteContent {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SiteContentStore for MemorySiteContent {
    async fn get(&self, site: &str, path: &str) -> Result<Option<String>, AppError> {
        let docs = self
            .docs
            .lock()
            .map_err(|_| AppError::Store("content lock poisoned".into()))?;
        Ok(docs.get(&(site.to_string(), path.to_string())).cloned())
    }

    async fn put(&self, site: &str, path: &str, content: &str) -> Result<(), AppError> {
        let mut docs = self
            .docs
            .lock()
            .map_err(|_| AppError::Store("content lock poisoned".into()))?;
        docs.insert((site.to_string(), path.to_string()), content.to_string());
        Ok(())
    }
}
