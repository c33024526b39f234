use crate::config::{ActionConfig, ActionFieldConfig};
use crate::error::AppError;
use crate::registry::ResourceRegistry;
use crate::service::ResourceStore;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// An action as clients see it in `GET /actions`.
#[derive(Clone, Debug, Serialize)]
pub struct ActionDefinition {
    pub entity_type: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub input_fields: Vec<ActionFieldConfig>,
    pub performer: String,
}

impl From<&ActionConfig> for ActionDefinition {
    fn from(a: &ActionConfig) -> Self {
        ActionDefinition {
            entity_type: a.entity_type.clone(),
            name: a.name.clone(),
            label: a.label.clone(),
            input_fields: a.input_fields.clone(),
            performer: a.performer.clone(),
        }
    }
}

/// What a performer can reach while it runs.
pub struct ActionContext<'a> {
    pub definition: &'a ActionDefinition,
    pub registry: &'a ResourceRegistry,
    pub rows: &'a dyn ResourceStore,
}

/// A side effect invoked by action name. Repeated invocation semantics are up to the performer.
#[async_trait]
pub trait ActionPerformer: Send + Sync {
    fn name(&self) -> &str;

    async fn perform(&self, ctx: &ActionContext<'_>, input: &Map<String, Value>) -> Result<Value, AppError>;
}

/// Performers by name, before they are bound to action definitions.
#[derive(Clone, Default)]
pub struct PerformerSet {
    performers: HashMap<String, Arc<dyn ActionPerformer>>,
}

impl PerformerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `__row_create` and `__data_export`.
    pub fn with_builtins() -> Self {
        let mut set = Self::new();
        set.register(Arc::new(super::builtin::RowCreatePerformer));
        set.register(Arc::new(super::builtin::DataExportPerformer));
        set
    }

    pub fn register(&mut self, performer: Arc<dyn ActionPerformer>) {
        self.performers.insert(performer.name().to_string(), performer);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionPerformer>> {
        self.performers.get(name).cloned()
    }
}

struct BoundAction {
    definition: ActionDefinition,
    performer: Arc<dyn ActionPerformer>,
}

pub struct ActionEngine {
    actions: HashMap<(String, String), BoundAction>,
    order: Vec<(String, String)>,
    registry: Arc<ResourceRegistry>,
    rows: Arc<dyn ResourceStore>,
}

impl ActionEngine {
    /// Bind each config to its performer. Actions whose performer or entity type is unknown are skipped.
    pub fn build(
        configs: &[ActionConfig],
        performers: &PerformerSet,
        registry: Arc<ResourceRegistry>,
        rows: Arc<dyn ResourceStore>,
    ) -> Self {
        let mut actions = HashMap::new();
        let mut order = Vec::new();
        for config in configs {
            let Some(performer) = performers.get(&config.performer) else {
                tracing::warn!(
                    entity_type = %config.entity_type,
                    action = %config.name,
                    performer = %config.performer,
                    "action skipped: performer not registered"
                );
                continue;
            };
            if registry.get(&config.entity_type).is_err() {
                tracing::warn!(entity_type = %config.entity_type, action = %config.name, "action skipped: unknown entity type");
                continue;
            }
            let key = (config.entity_type.clone(), config.name.clone());
            order.push(key.clone());
            actions.insert(
                key,
                BoundAction {
                    definition: ActionDefinition::from(config),
                    performer,
                },
            );
        }
        tracing::info!(actions = order.len(), "actions bound");
        ActionEngine {
            actions,
            order,
            registry,
            rows,
        }
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ActionDefinition> {
        self.order
            .iter()
            .filter_map(|k| self.actions.get(k))
            .map(|a| &a.definition)
    }

    pub fn definition(&self, entity_type: &str, action: &str) -> Option<&ActionDefinition> {
        self.actions
            .get(&(entity_type.to_string(), action.to_string()))
            .map(|a| &a.definition)
    }

    /// Dispatch to the performer bound to (entity_type, action). Read and write invocations share this path.
    pub async fn invoke(&self, entity_type: &str, action: &str, input: &Map<String, Value>) -> Result<Value, AppError> {
        let bound = self
            .actions
            .get(&(entity_type.to_string(), action.to_string()))
            .ok_or_else(|| AppError::NotFound(format!("action {}/{}", entity_type, action)))?;
        for field in bound.definition.input_fields.iter().filter(|f| f.required) {
            match input.get(&field.name) {
                None | Some(Value::Null) => {
                    return Err(AppError::Validation(format!("{} is required", field.name)));
                }
                Some(Value::String(s)) if s.is_empty() => {
                    return Err(AppError::Validation(format!("{} is required", field.name)));
                }
                Some(_) => {}
            }
        }
        let ctx = ActionContext {
            definition: &bound.definition,
            registry: &self.registry,
            rows: self.rows.as_ref(),
        };
        tracing::debug!(entity_type = %entity_type, action = %action, performer = %bound.performer.name(), "invoking action");
        bound.performer.perform(&ctx, input).await.map_err(|e| {
            tracing::warn!(entity_type = %entity_type, action = %action, error = %e, "action failed");
            performer_failure(entity_type, action, e)
        })
    }
}

/// Client errors keep their class; backend failures inside a performer surface as `ActionFailed`.
fn performer_failure(entity_type: &str, action: &str, e: AppError) -> AppError {
    match e {
        AppError::Db(_) | AppError::Store(_) | AppError::Config(_) => AppError::ActionFailed {
            action: format!("{}/{}", entity_type, action),
            message: e.to_string(),
        },
        other => other,
    }
}
