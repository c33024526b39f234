//! Durable catalog: the unified schema flattened into table rows and relation rows.
//!
//! `from_entries(to_entries(u))` must give back `u` so that the next boot introspects exactly
//! the schema this boot produced.

use crate::config::{ActionConfig, StateMachineConfig};
use crate::error::AppError;
use crate::schema::model::{ColumnDefinition, RelationDefinition, RelationKind, TableDefinition, UnifiedSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub name: String,
    pub position: i64,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEntry {
    pub position: i64,
    pub kind: RelationKind,
    pub subject: String,
    pub object: String,
    #[serde(default)]
    pub join_table: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogEntries {
    pub tables: Vec<TableEntry>,
    pub relations: Vec<RelationEntry>,
}

impl CatalogEntries {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.relations.is_empty()
    }
}

pub fn to_entries(schema: &UnifiedSchema) -> CatalogEntries {
    let mut out = CatalogEntries::default();
    for (i, table) in schema.tables.iter().enumerate() {
        out.tables.push(TableEntry {
            name: table.name.clone(),
            position: i as i64,
            columns: table.columns.clone(),
            unique: table.unique.clone(),
        });
        for rel in &table.relations {
            out.relations.push(RelationEntry {
                position: out.relations.len() as i64,
                kind: rel.kind,
                subject: table.name.clone(),
                object: rel.object.clone(),
                join_table: rel.join_table.clone(),
            });
        }
    }
    out
}

/// Rebuild tables from catalog rows. Relations whose subject table is gone are skipped.
pub fn from_entries(mut entries: CatalogEntries) -> Vec<TableDefinition> {
    entries.tables.sort_by_key(|t| t.position);
    entries.relations.sort_by_key(|r| r.position);
    let mut tables: Vec<TableDefinition> = entries
        .tables
        .into_iter()
        .map(|t| TableDefinition {
            name: t.name,
            columns: t.columns,
            relations: Vec::new(),
            unique: t.unique,
        })
        .collect();
    for rel in entries.relations {
        match tables.iter_mut().find(|t| t.name == rel.subject) {
            Some(table) => table.relations.push(RelationDefinition {
                kind: rel.kind,
                subject: rel.subject,
                object: rel.object,
                join_table: rel.join_table,
            }),
            None => tracing::warn!(subject = %rel.subject, object = %rel.object, "catalog relation without table"),
        }
    }
    tables
}

/// Where the unified schema is recorded between boots.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Create whatever bookkeeping storage the catalog needs.
    async fn prepare(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn read(&self) -> Result<CatalogEntries, AppError>;
    async fn write(&self, entries: &CatalogEntries) -> Result<(), AppError>;

    /// Record state machine and action definitions for inspection. Not read back at boot.
    async fn write_definitions(
        &self,
        _machines: &[StateMachineConfig],
        _actions: &[ActionConfig],
    ) -> Result<(), AppError> {
        Ok(())
    }
}

/// Existing tables as recorded by the previous boot.
pub async fn introspect(catalog: &dyn Catalog) -> Result<Vec<TableDefinition>, AppError> {
    let entries = catalog.read().await?;
    let tables = from_entries(entries);
    tracing::info!(tables = tables.len(), "introspected catalog");
    Ok(tables)
}

/// Catalog kept in process memory; for embedding and tests.
#[derive(Default)]
pub struct MemoryCatalog {
    entries: Mutex<CatalogEntries>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CatalogEntries {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn read(&self) -> Result<CatalogEntries, AppError> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| AppError::Store("catalog lock poisoned".into()))?;
        Ok(guard.clone())
    }

    async fn write(&self, entries: &CatalogEntries) -> Result<(), AppError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| AppError::Store("catalog lock poisoned".into()))?;
        *guard = entries.clone();
        Ok(())
    }
}
