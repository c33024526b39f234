//! Row storage seam for registry resources.

use crate::error::AppError;
use crate::registry::{IncludeSpec, Resource, ResourceRegistry};
use crate::sql::{DEFAULT_LIMIT, MAX_LIMIT};
use async_trait::async_trait;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default)]
pub struct ListQuery {
    /// Exact-match column filters.
    pub filters: Vec<(String, Value)>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    /// Include names from `Resource::includes`.
    pub include: Vec<String>,
}

impl ListQuery {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// Pair each requested include with its related resource. Unknown names are a bad request.
pub fn resolve_includes<'a>(
    registry: &'a ResourceRegistry,
    resource: &'a Resource,
    names: &[String],
) -> Result<Vec<(&'a IncludeSpec, &'a Resource)>, AppError> {
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let spec = resource
            .include(name)
            .ok_or_else(|| AppError::BadRequest(format!("{} has no include '{}'", resource.name, name)))?;
        out.push((spec, registry.get(&spec.related)?));
    }
    Ok(out)
}

/// Each call is a single atomic statement against the backing store.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn list(
        &self,
        registry: &ResourceRegistry,
        resource: &Resource,
        query: &ListQuery,
    ) -> Result<Vec<Value>, AppError>;

    async fn read(&self, resource: &Resource, id: &Value) -> Result<Option<Value>, AppError>;

    async fn create(&self, resource: &Resource, body: &Map<String, Value>) -> Result<Value, AppError>;

    async fn update(
        &self,
        resource: &Resource,
        id: &Value,
        body: &Map<String, Value>,
    ) -> Result<Option<Value>, AppError>;

    async fn delete(&self, resource: &Resource, id: &Value) -> Result<Option<Value>, AppError>;

    /// Readiness probe.
    async fn ping(&self) -> Result<(), AppError>;
}
