//! Performers available to every deployment without registration.

use crate::action::{ActionContext, ActionPerformer};
use crate::error::AppError;
use crate::service::{ListQuery, RequestValidator};
use crate::sql::MAX_LIMIT;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// `__row_create`: insert the input as a row of the action's entity type.
pub struct RowCreatePerformer;

#[async_trait]
impl ActionPerformer for RowCreatePerformer {
    fn name(&self) -> &str {
        "__row_create"
    }

    async fn perform(&self, ctx: &ActionContext<'_>, input: &Map<String, Value>) -> Result<Value, AppError> {
        let resource = ctx.registry.get(&ctx.definition.entity_type)?;
        RequestValidator::validate_create(resource, input)?;
        ctx.rows.create(resource, input).await
    }
}

/// `__data_export`: every row of the action's entity type.
pub struct DataExportPerformer;

#[async_trait]
impl ActionPerformer for DataExportPerformer {
    fn name(&self) -> &str {
        "__data_export"
    }

    async fn perform(&self, ctx: &ActionContext<'_>, _input: &Map<String, Value>) -> Result<Value, AppError> {
        let resource = ctx.registry.get(&ctx.definition.entity_type)?;
        let mut rows = Vec::new();
        let mut offset = 0u32;
        loop {
            let query = ListQuery {
                limit: Some(MAX_LIMIT),
                offset: Some(offset),
                ..Default::default()
            };
            let page = ctx.rows.list(ctx.registry, resource, &query).await?;
            let done = (page.len() as u32) < MAX_LIMIT;
            rows.extend(page);
            if done {
                break;
            }
            offset += MAX_LIMIT;
        }
        Ok(json!({
            "entity_type": resource.name,
            "count": rows.len(),
            "rows": rows,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionEngine, PerformerSet};
    use crate::config::ActionConfig;
    use crate::registry::ResourceRegistry;
    use crate::schema::{ColumnDefinition, ColumnType, TableDefinition, UnifiedSchema};
    use crate::service::MemoryResourceStore;
    use std::sync::Arc;

    fn action(name: &str, performer: &str) -> ActionConfig {
        ActionConfig {
            entity_type: "order".into(),
            name: name.into(),
            label: None,
            input_fields: vec![],
            performer: performer.into(),
        }
    }

    #[tokio::test]
    async fn create_then_export() {
        let mut amount = ColumnDefinition::new("amount", ColumnType::Integer);
        amount.nullable = false;
        let schema = UnifiedSchema::new(vec![TableDefinition::new("order").with_columns(vec![amount])]);
        let registry = Arc::new(ResourceRegistry::build(&schema, "public"));
        let engine = ActionEngine::build(
            &[action("add", "__row_create"), action("export", "__data_export")],
            &PerformerSet::with_builtins(),
            registry,
            Arc::new(MemoryResourceStore::new()),
        );

        let input = json!({"amount": 4}).as_object().cloned().unwrap();
        engine.invoke("order", "add", &input).await.unwrap();
        assert!(matches!(
            engine.invoke("order", "add", &Map::new()).await,
            Err(AppError::Validation(_))
        ));
        let export = engine.invoke("order", "export", &Map::new()).await.unwrap();
        assert_eq!(export["count"], json!(1));
        assert_eq!(export["rows"][0]["amount"], json!(4));
    }
}
