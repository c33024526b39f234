//! Boot pipeline. Stages run strictly in order, each consuming what the previous one produced.
//! Any error is fatal and names its stage; the listener must not start after a failed boot.

use crate::action::{ActionEngine, PerformerSet};
use crate::config::{validate, InitConfig};
use crate::error::{AppError, BootError, BootStage, ConfigError};
use crate::migration::{apply_plan, plan, DdlExecutor, DiscardDdl, MaterializeReport};
use crate::registry::ResourceRegistry;
use crate::schema::{
    introspect, reconcile, to_entries, Catalog, MemoryCatalog, ReconciliationConflict, RelationManager,
    TableDefinition, UnifiedSchema,
};
use crate::service::{CrudService, MemoryResourceStore, ResourceStore};
use crate::site::{MemorySiteContent, PgSiteContent, SiteContentStore};
use crate::state::AppState;
use crate::store::PgCatalog;
use crate::tracking::{MemoryStateStore, PgStateStore, StateMachineManager, StateStore};
use sqlx::PgPool;
use std::sync::Arc;

/// Storage the pipeline writes to and the running service reads from.
#[derive(Clone)]
pub struct Backends {
    pub catalog: Arc<dyn Catalog>,
    pub ddl: Arc<dyn DdlExecutor>,
    pub rows: Arc<dyn ResourceStore>,
    pub states: Arc<dyn StateStore>,
    pub content: Arc<dyn SiteContentStore>,
}

impl Backends {
    pub fn postgres(pool: PgPool) -> Self {
        Backends {
            catalog: Arc::new(PgCatalog::new(pool.clone())),
            ddl: Arc::new(pool.clone()),
            rows: Arc::new(CrudService::new(pool.clone())),
            states: Arc::new(PgStateStore::new(pool.clone())),
            content: Arc::new(PgSiteContent::new(pool)),
        }
    }

    /// Everything in process memory. DDL is discarded.
    pub fn memory() -> Self {
        Backends {
            catalog: Arc::new(MemoryCatalog::new()),
            ddl: Arc::new(DiscardDdl),
            rows: Arc::new(MemoryResourceStore::new()),
            states: Arc::new(MemoryStateStore::new()),
            content: Arc::new(MemorySiteContent::new()),
        }
    }
}

/// What boot decided, for logging and inspection.
#[derive(Clone, Debug, Default)]
pub struct BootReport {
    pub created: Vec<String>,
    pub modified: Vec<String>,
    pub conflicts: Vec<ReconciliationConflict>,
    pub materialized: MaterializeReport,
}

pub struct Booted {
    pub state: AppState,
    pub report: BootReport,
}

/// Run every stage against `backends` and return the immutable request state.
pub async fn boot(
    config: &InitConfig,
    data_schema: &str,
    backends: Backends,
    performers: &PerformerSet,
) -> Result<Booted, BootError> {
    validate(config)
        .map_err(AppError::from)
        .map_err(BootError::at(BootStage::Validate))?;

    backends
        .catalog
        .prepare()
        .await
        .map_err(BootError::at(BootStage::Catalog))?;
    tracing::info!(stage = %BootStage::Catalog, "boot stage done");

    let existing = introspect(backends.catalog.as_ref())
        .await
        .map_err(BootError::at(BootStage::Introspect))?;
    tracing::info!(stage = %BootStage::Introspect, tables = existing.len(), "boot stage done");

    let (schema, mut report) = reconcile_stage(config, &existing);
    tracing::info!(
        stage = %BootStage::Reconcile,
        tables = schema.tables.len(),
        created = report.created.len(),
        modified = report.modified.len(),
        conflicts = report.conflicts.len(),
        "boot stage done"
    );

    let migration = plan(&schema, data_schema);
    report.materialized = apply_plan(backends.ddl.as_ref(), &migration).await;
    tracing::info!(stage = %BootStage::Materialize, steps = migration.steps.len(), "boot stage done");

    backends
        .catalog
        .write(&to_entries(&schema))
        .await
        .map_err(BootError::at(BootStage::Persist))?;
    backends
        .catalog
        .write_definitions(&config.state_machines, &config.actions)
        .await
        .map_err(BootError::at(BootStage::Persist))?;
    tracing::info!(stage = %BootStage::Persist, "boot stage done");

    let registry = Arc::new(ResourceRegistry::build(&schema, data_schema));
    tracing::info!(stage = %BootStage::Registry, resources = registry.len(), "boot stage done");

    let machines = tracking_stage(config, &registry, backends.states.clone()).map_err(BootError::at(BootStage::Tracking))?;
    tracing::info!(stage = %BootStage::Tracking, "boot stage done");

    let actions = ActionEngine::build(&config.actions, performers, registry.clone(), backends.rows.clone());
    tracing::info!(stage = %BootStage::Actions, "boot stage done");

    Ok(Booted {
        state: AppState {
            schema: Arc::new(schema),
            registry,
            rows: backends.rows,
            machines: Arc::new(machines),
            actions: Arc::new(actions),
            content: backends.content,
        },
        report,
    })
}

fn reconcile_stage(config: &InitConfig, existing: &[TableDefinition]) -> (UnifiedSchema, BootReport) {
    let declared: Vec<TableDefinition> = config.tables.iter().map(TableDefinition::from).collect();
    let merged = reconcile(&declared, existing);
    let mut schema = merged.schema;
    let mut conflicts = merged.conflicts;
    conflicts.extend(RelationManager::expand(&mut schema));
    let report = BootReport {
        created: merged.created,
        modified: merged.modified,
        conflicts,
        materialized: MaterializeReport::default(),
    };
    (schema, report)
}

fn tracking_stage(
    config: &InitConfig,
    registry: &ResourceRegistry,
    store: Arc<dyn StateStore>,
) -> Result<StateMachineManager, AppError> {
    for sm in &config.state_machines {
        if registry.get(&sm.entity_type).is_err() {
            return Err(ConfigError::Validation(format!(
                "state machine {} tracks unknown entity type {}",
                sm.name, sm.entity_type
            ))
            .into());
        }
    }
    Ok(StateMachineManager::from_configs(&config.state_machines, store)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ActionConfig, ColumnConfig, EventConfig, RelationConfig, StateMachineConfig, TableConfig};
    use crate::schema::{ColumnType, RelationKind};

    fn column(name: &str, t: ColumnType) -> ColumnConfig {
        serde_json::from_value(serde_json::json!({ "name": name, "type": t })).unwrap()
    }

    fn config() -> InitConfig {
        InitConfig {
            tables: vec![
                TableConfig {
                    name: "customer".into(),
                    columns: vec![column("email", ColumnType::Email)],
                    relations: vec![],
                    unique: vec![],
                },
                TableConfig {
                    name: "order".into(),
                    columns: vec![column("total", ColumnType::Measurement)],
                    relations: vec![RelationConfig {
                        kind: RelationKind::ManyToOne,
                        target: "customer".into(),
                    }],
                    unique: vec![],
                },
            ],
            state_machines: vec![StateMachineConfig {
                name: "order_flow".into(),
                label: None,
                entity_type: "order".into(),
                initial_state: "new".into(),
                states: vec!["new".into(), "paid".into()],
                events: vec![EventConfig {
                    name: "pay".into(),
                    label: None,
                    src: vec!["new".into()],
                    dst: "paid".into(),
                }],
            }],
            actions: vec![ActionConfig {
                entity_type: "order".into(),
                name: "export".into(),
                label: None,
                input_fields: vec![],
                performer: "__data_export".into(),
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn memory_boot_builds_everything() {
        let booted = boot(&config(), "public", Backends::memory(), &PerformerSet::with_builtins())
            .await
            .unwrap();
        let state = booted.state;
        assert_eq!(state.registry.len(), 2);
        assert!(state.registry.get("order").unwrap().column("customer_id").is_some());
        assert!(state.machines.for_entity_type("order").is_some());
        assert!(state.actions.definition("order", "export").is_some());
        assert_eq!(booted.report.created.len(), 2);
        assert!(booted.report.materialized.failed.is_empty());
    }

    #[tokio::test]
    async fn second_boot_reaches_the_same_schema() {
        let backends = Backends::memory();
        let first = boot(&config(), "public", backends.clone(), &PerformerSet::new()).await.unwrap();
        let second = boot(&config(), "public", backends, &PerformerSet::new()).await.unwrap();
        assert_eq!(first.state.schema.tables, second.state.schema.tables);
        assert!(second.report.created.is_empty());
        let order = second.state.schema.table("order").unwrap();
        assert_eq!(order.relations.len(), 1);
    }

    #[tokio::test]
    async fn machine_on_unknown_type_fails_at_tracking() {
        let mut cfg = config();
        cfg.state_machines[0].entity_type = "invoice".into();
        let err = match boot(&cfg, "public", Backends::memory(), &PerformerSet::new()).await {
            Err(e) => e,
            Ok(_) => panic!("boot should fail"),
        };
        assert_eq!(err.stage, BootStage::Tracking);
    }

    #[tokio::test]
    async fn invalid_identifier_fails_at_validate() {
        let mut cfg = config();
        cfg.tables[0].name = "bad name".into();
        let err = match boot(&cfg, "public", Backends::memory(), &PerformerSet::new()).await {
            Err(e) => e,
            Ok(_) => panic!("boot should fail"),
        };
        assert_eq!(err.stage, BootStage::Validate);
    }
}
