//! `StateStore` over `_entity_state` and `_entity_state_history` in the catalog schema.

use crate::store::{qualified_sys_table, ENTITY_STATE_HISTORY_TABLE, ENTITY_STATE_TABLE};
use crate::tracking::store::{EntityStateRecord, StateStore, StoreError, TransitionEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[derive(Clone)]
pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    pub fn new(pool: PgPool) -> Self {
        PgStateStore { pool }
    }

    async fn history(&self, id: Uuid) -> Result<Vec<TransitionEntry>, StoreError> {
        let sql = format!(
            "SELECT from_state, event, to_state, created_at FROM {} WHERE state_id = $1 ORDER BY seq",
            qualified_sys_table(ENTITY_STATE_HISTORY_TABLE)
        );
        let rows = sqlx::query(&sql).bind(id).fetch_all(&self.pool).await.map_err(backend)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(TransitionEntry {
                from: row.try_get("from_state").map_err(backend)?,
                event: row.try_get("event").map_err(backend)?,
                to: row.try_get("to_state").map_err(backend)?,
                at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(backend)?,
            });
        }
        Ok(out)
    }

    async fn with_history(&self, row: sqlx::postgres::PgRow) -> Result<EntityStateRecord, StoreError> {
        let id: Uuid = row.try_get("id").map_err(backend)?;
        Ok(EntityStateRecord {
            id,
            machine_id: row.try_get("machine_id").map_err(backend)?,
            entity_type: row.try_get("entity_type").map_err(backend)?,
            entity_id: row.try_get("entity_id").map_err(backend)?,
            current_state: row.try_get("current_state").map_err(backend)?,
            version: row.try_get("version").map_err(backend)?,
            created_at: row.try_get("created_at").map_err(backend)?,
            history: self.history(id).await?,
        })
    }
}

const RECORD_COLUMNS: &str = "id, machine_id, entity_type, entity_id, current_state, version, created_at";

/// Compare-and-swap on (version, current_state); zero rows means another writer won.
fn transition_sql(state_table: &str) -> String {
    format!(
        "UPDATE {} SET current_state = $1, version = version + 1, updated_at = $2 \
         WHERE id = $3 AND version = $4 AND current_state = $5 RETURNING version",
        state_table
    )
}

fn history_insert_sql(history_table: &str) -> String {
    format!(
        "INSERT INTO {} (state_id, seq, from_state, event, to_state, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        history_table
    )
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn insert(&self, record: &EntityStateRecord) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, machine_id, entity_type, entity_id, current_state, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)",
            qualified_sys_table(ENTITY_STATE_TABLE)
        );
        tracing::debug!(sql = %sql, "query");
        let result = sqlx::query(&sql)
            .bind(record.id)
            .bind(&record.machine_id)
            .bind(&record.entity_type)
            .bind(&record.entity_id)
            .bind(&record.current_state)
            .bind(record.version)
            .bind(record.created_at)
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let duplicate = e
                    .as_database_error()
                    .and_then(|d| d.code())
                    .map(|code| code == UNIQUE_VIOLATION)
                    .unwrap_or(false);
                if duplicate {
                    Err(StoreError::AlreadyTracked {
                        machine_id: record.machine_id.clone(),
                        entity_id: record.entity_id.clone(),
                    })
                } else {
                    Err(backend(e))
                }
            }
        }
    }

    async fn load(&self, id: Uuid) -> Result<EntityStateRecord, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            RECORD_COLUMNS,
            qualified_sys_table(ENTITY_STATE_TABLE)
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound(id))?;
        self.with_history(row).await
    }

    async fn find(&self, machine_id: &str, entity_id: &str) -> Result<Option<EntityStateRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE machine_id = $1 AND entity_id = $2",
            RECORD_COLUMNS,
            qualified_sys_table(ENTITY_STATE_TABLE)
        );
        let row = sqlx::query(&sql)
            .bind(machine_id)
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match row {
            Some(row) => Ok(Some(self.with_history(row).await?)),
            None => Ok(None),
        }
    }

    async fn commit_transition(
        &self,
        id: Uuid,
        expected_version: i64,
        entry: &TransitionEntry,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let update = transition_sql(&qualified_sys_table(ENTITY_STATE_TABLE));
        tracing::debug!(sql = %update, "query");
        let new_version: Option<i64> = sqlx::query_scalar(&update)
            .bind(&entry.to)
            .bind(entry.at)
            .bind(id)
            .bind(expected_version)
            .bind(&entry.from)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?;
        // Dropping `tx` rolls back.
        let Some(new_version) = new_version else {
            return Err(StoreError::Conflict { id, expected_version });
        };
        let insert = history_insert_sql(&qualified_sys_table(ENTITY_STATE_HISTORY_TABLE));
        sqlx::query(&insert)
            .bind(id)
            .bind(new_version)
            .bind(&entry.from)
            .bind(&entry.event)
            .bind(&entry.to)
            .bind(entry.at)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        Ok(new_version)
    }
}
