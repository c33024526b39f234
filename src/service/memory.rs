//! Rows kept in process memory. Column defaults other than keys and timestamps are stored as null;
//! unique constraints other than the primary key are not enforced.

use crate::error::AppError;
use crate::registry::{IncludeDirection, PkType, Resource, ResourceRegistry};
use crate::service::store::{resolve_includes, ListQuery, ResourceStore};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct MemoryTable {
    next_id: i64,
    rows: Vec<Map<String, Value>>,
}

#[derive(Default)]
pub struct MemoryResourceStore {
    tables: Mutex<HashMap<String, MemoryTable>>,
}

/// Text form used for key and filter comparison, matching how values are bound in SQL.
fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn same(a: Option<&Value>, b: &Value) -> bool {
    match a {
        Some(a) => text_of(a).is_some() && text_of(a) == text_of(b),
        None => false,
    }
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, MemoryTable>>, AppError> {
        self.tables
            .lock()
            .map_err(|_| AppError::Store("row store lock poisoned".into()))
    }

    /// Rows of `table` in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Map<String, Value>> {
        self.lock()
            .map(|t| t.get(table).map(|t| t.rows.clone()).unwrap_or_default())
            .unwrap_or_default()
    }
}

fn embed(
    tables: &HashMap<String, MemoryTable>,
    registry: &ResourceRegistry,
    resource: &Resource,
    names: &[String],
    row: &mut Map<String, Value>,
) -> Result<(), AppError> {
    for (spec, related) in resolve_includes(registry, resource, names)? {
        let key = row.get(&spec.our_key_column).cloned().unwrap_or(Value::Null);
        let matching = tables
            .get(&related.name)
            .map(|t| t.rows.as_slice())
            .unwrap_or_default()
            .iter()
            .filter(|r| same(r.get(&spec.their_key_column), &key));
        let value = match spec.direction {
            IncludeDirection::ToOne => matching.map(|r| Value::Object(r.clone())).next().unwrap_or(Value::Null),
            IncludeDirection::ToMany => Value::Array(matching.map(|r| Value::Object(r.clone())).collect()),
        };
        row.insert(spec.name.clone(), value);
    }
    Ok(())
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn list(
        &self,
        registry: &ResourceRegistry,
        resource: &Resource,
        query: &ListQuery,
    ) -> Result<Vec<Value>, AppError> {
        let tables = self.lock()?;
        let Some(table) = tables.get(&resource.name) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let selected = table
            .rows
            .iter()
            .filter(|row| {
                query
                    .filters
                    .iter()
                    .filter(|(col, _)| resource.column(col).is_some())
                    .all(|(col, v)| same(row.get(col), v))
            })
            .skip(query.offset() as usize)
            .take(query.limit() as usize);
        for row in selected {
            let mut row = row.clone();
            embed(&tables, registry, resource, &query.include, &mut row)?;
            out.push(Value::Object(row));
        }
        Ok(out)
    }

    async fn read(&self, resource: &Resource, id: &Value) -> Result<Option<Value>, AppError> {
        let tables = self.lock()?;
        Ok(tables.get(&resource.name).and_then(|t| {
            t.rows
                .iter()
                .find(|r| same(r.get(&resource.pk_column), id))
                .map(|r| Value::Object(r.clone()))
        }))
    }

    async fn create(&self, resource: &Resource, body: &Map<String, Value>) -> Result<Value, AppError> {
        let mut tables = self.lock()?;
        let table = tables.entry(resource.name.clone()).or_default();
        let now = Value::String(Utc::now().to_rfc3339());
        let mut row = Map::new();
        for c in &resource.columns {
            let value = match body.get(&c.name) {
                Some(v) => v.clone(),
                None if c.primary_key && c.has_default => match resource.pk_type {
                    PkType::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),
                    _ => {
                        table.next_id += 1;
                        Value::from(table.next_id)
                    }
                },
                None if c.name == "created_at" || c.name == "updated_at" => now.clone(),
                None => Value::Null,
            };
            row.insert(c.name.clone(), value);
        }
        let key = row.get(&resource.pk_column).cloned().unwrap_or(Value::Null);
        if let Some(n) = key.as_i64() {
            table.next_id = table.next_id.max(n);
        }
        if table.rows.iter().any(|r| same(r.get(&resource.pk_column), &key)) {
            return Err(AppError::Conflict(format!("{} {} already exists", resource.name, key)));
        }
        table.rows.push(row.clone());
        Ok(Value::Object(row))
    }

    async fn update(
        &self,
        resource: &Resource,
        id: &Value,
        body: &Map<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        let mut tables = self.lock()?;
        let Some(row) = tables
            .get_mut(&resource.name)
            .and_then(|t| t.rows.iter_mut().find(|r| same(r.get(&resource.pk_column), id)))
        else {
            return Ok(None);
        };
        for (k, v) in body {
            if *k != resource.pk_column && resource.column(k).is_some() {
                row.insert(k.clone(), v.clone());
            }
        }
        if resource.column("updated_at").is_some() {
            row.insert("updated_at".into(), Value::String(Utc::now().to_rfc3339()));
        }
        Ok(Some(Value::Object(row.clone())))
    }

    async fn delete(&self, resource: &Resource, id: &Value) -> Result<Option<Value>, AppError> {
        let mut tables = self.lock()?;
        let Some(table) = tables.get_mut(&resource.name) else {
            return Ok(None);
        };
        let pos = table.rows.iter().position(|r| same(r.get(&resource.pk_column), id));
        Ok(pos.map(|i| Value::Object(table.rows.remove(i))))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
