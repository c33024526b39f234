//! Catalog table DDL and persistence. All bookkeeping tables live in a schema named from
//! `GOMS_SCHEMA` env (default `goms`); data tables live in the configured data schema.

use crate::config::{ActionConfig, StateMachineConfig};
use crate::error::AppError;
use crate::schema::catalog::{Catalog, CatalogEntries, RelationEntry, TableEntry};
use async_trait::async_trait;
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;

/// Schema name for catalog tables. From env `GOMS_SCHEMA`, default `goms`.
pub fn catalog_schema() -> String {
    std::env::var("GOMS_SCHEMA").unwrap_or_else(|_| "goms".into())
}

/// Schema-qualified catalog table name (e.g. "goms._world").
pub fn qualified_sys_table(table: &str) -> String {
    format!("{}.{}", catalog_schema(), table)
}

pub const WORLD_TABLE: &str = "_world";
pub const WORLD_RELATION_TABLE: &str = "_world_relation";
pub const STATE_MACHINE_TABLE: &str = "_state_machine";
pub const ACTION_TABLE: &str = "_action";
pub const ENTITY_STATE_TABLE: &str = "_entity_state";
pub const ENTITY_STATE_HISTORY_TABLE: &str = "_entity_state_history";
pub const SITE_CONTENT_TABLE: &str = "_site_content";

/// Versioned payload tables; each keeps a `<name>_history` copy of replaced rows.
const PAYLOAD_TABLES: &[&str] = &[WORLD_TABLE, WORLD_RELATION_TABLE, STATE_MACHINE_TABLE, ACTION_TABLE];

/// Create the catalog schema and every bookkeeping table if missing.
pub async fn ensure_catalog_tables(pool: &PgPool) -> Result<(), AppError> {
    let schema = catalog_schema();
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
        .execute(pool)
        .await?;

    for table in PAYLOAD_TABLES {
        let q_table = qualified_sys_table(table);
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                position BIGINT NOT NULL DEFAULT 0,
                payload JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                version BIGINT NOT NULL DEFAULT 1
            )
            "#,
            q_table
        );
        sqlx::query(&ddl).execute(pool).await?;

        let history_table = qualified_sys_table(&format!("{}_history", table));
        let history_ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT NOT NULL,
                payload JSONB NOT NULL,
                version BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (id, version)
            )
            "#,
            history_table
        );
        sqlx::query(&history_ddl).execute(pool).await?;
    }

    let q_state = qualified_sys_table(ENTITY_STATE_TABLE);
    let state_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id UUID PRIMARY KEY,
            machine_id TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            current_state TEXT NOT NULL,
            version BIGINT NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (machine_id, entity_id)
        )
        "#,
        q_state
    );
    sqlx::query(&state_ddl).execute(pool).await?;

    let q_state_history = qualified_sys_table(ENTITY_STATE_HISTORY_TABLE);
    let state_history_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            state_id UUID NOT NULL REFERENCES {} (id),
            seq BIGINT NOT NULL,
            from_state TEXT NOT NULL,
            event TEXT NOT NULL,
            to_state TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (state_id, seq)
        )
        "#,
        q_state_history, q_state
    );
    sqlx::query(&state_history_ddl).execute(pool).await?;

    let q_site = qualified_sys_table(SITE_CONTENT_TABLE);
    let site_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            site TEXT NOT NULL,
            path TEXT NOT NULL,
            content TEXT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (site, path)
        )
        "#,
        q_site
    );
    sqlx::query(&site_ddl).execute(pool).await?;

    Ok(())
}

/// One row for a versioned payload table.
#[derive(Clone, Debug)]
pub struct PayloadRow {
    pub id: String,
    pub position: i64,
    pub payload: serde_json::Value,
}

/// Deep-compare incoming rows with current stored payloads (by id, with position).
fn payloads_unchanged(current: &HashMap<String, (i64, serde_json::Value)>, rows: &[PayloadRow]) -> bool {
    if current.len() != rows.len() {
        return false;
    }
    rows.iter().all(|row| match current.get(&row.id) {
        Some((position, payload)) => *position == row.position && *payload == row.payload,
        None => false,
    })
}

/// Statements of one payload replace, in execution order.
struct PayloadSql {
    archive: String,
    clear: String,
    insert: String,
}

impl PayloadSql {
    fn new(table: &str, history_table: &str) -> Self {
        PayloadSql {
            archive: format!(
                "INSERT INTO {} (id, payload, version, created_at) \
                 SELECT id, payload, version, updated_at FROM {} ON CONFLICT DO NOTHING",
                history_table, table
            ),
            clear: format!("DELETE FROM {}", table),
            insert: format!(
                "INSERT INTO {} (id, position, payload, updated_at, version) VALUES ($1, $2, $3, NOW(), $4)",
                table
            ),
        }
    }
}

/// Replace all rows of a payload table: copy current to history, delete, insert with new version.
/// If incoming rows equal current ones, nothing is written. Returns (rows written, version).
/// Call within a transaction.
pub async fn replace_payload_rows(
    tx: &mut sqlx::PgConnection,
    table: &str,
    rows: &[PayloadRow],
) -> Result<(u64, i64), AppError> {
    let q_table = qualified_sys_table(table);
    let current_version: (Option<i64>,) = sqlx::query_as(&format!("SELECT MAX(version) FROM {}", q_table))
        .fetch_one(&mut *tx)
        .await?;
    let current_version = current_version.0.unwrap_or(0);

    let stored: Vec<(String, i64, serde_json::Value)> =
        sqlx::query_as(&format!("SELECT id, position, payload FROM {}", q_table))
            .fetch_all(&mut *tx)
            .await?;
    let current: HashMap<String, (i64, serde_json::Value)> =
        stored.into_iter().map(|(id, pos, payload)| (id, (pos, payload))).collect();

    if payloads_unchanged(&current, rows) {
        return Ok((0, current_version));
    }

    let history_table = qualified_sys_table(&format!("{}_history", table));
    let new_version = current_version + 1;

    let sql = PayloadSql::new(&q_table, &history_table);
    sqlx::query(&sql.archive).execute(&mut *tx).await?;
    sqlx::query(&sql.clear).execute(&mut *tx).await?;

    let mut count = 0u64;
    for row in rows {
        sqlx::query(&sql.insert)
            .bind(&row.id)
            .bind(row.position)
            .bind(&row.payload)
            .bind(new_version)
            .execute(&mut *tx)
            .await?;
        count += 1;
    }
    tracing::debug!(table = %table, rows = count, version = new_version, "payload rows replaced");
    Ok((count, new_version))
}

/// Replace one payload table in its own transaction.
pub async fn persist_rows(pool: &PgPool, table: &str, rows: &[PayloadRow]) -> Result<u64, AppError> {
    let mut tx = pool.begin().await?;
    let (count, _version) = replace_payload_rows(&mut tx, table, rows).await?;
    tx.commit().await?;
    Ok(count)
}

async fn load_payloads<T>(pool: &PgPool, table: &str) -> Result<Vec<T>, AppError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let sql = format!("SELECT payload FROM {} ORDER BY position, id", qualified_sys_table(table));
    tracing::debug!(sql = %sql, "query");
    let rows = sqlx::query_scalar::<_, serde_json::Value>(&sql).fetch_all(pool).await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let value: T = serde_json::from_value(row)
            .map_err(|e| AppError::Store(format!("{}: unreadable payload: {}", table, e)))?;
        out.push(value);
    }
    Ok(out)
}

fn to_payload<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::Store(e.to_string()))
}

/// Catalog backed by `_world` (tables with columns) and `_world_relation` (relations).
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        PgCatalog { pool }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn prepare(&self) -> Result<(), AppError> {
        ensure_catalog_tables(&self.pool).await
    }

    async fn read(&self) -> Result<CatalogEntries, AppError> {
        let tables: Vec<TableEntry> = load_payloads(&self.pool, WORLD_TABLE).await?;
        let relations: Vec<RelationEntry> = load_payloads(&self.pool, WORLD_RELATION_TABLE).await?;
        Ok(CatalogEntries { tables, relations })
    }

    async fn write(&self, entries: &CatalogEntries) -> Result<(), AppError> {
        let mut table_rows = Vec::with_capacity(entries.tables.len());
        for t in &entries.tables {
            table_rows.push(PayloadRow {
                id: t.name.clone(),
                position: t.position,
                payload: to_payload(t)?,
            });
        }
        let mut relation_rows = Vec::with_capacity(entries.relations.len());
        for r in &entries.relations {
            relation_rows.push(PayloadRow {
                id: format!("{}:{}:{}", r.subject, r.kind.as_str(), r.object),
                position: r.position,
                payload: to_payload(r)?,
            });
        }
        let mut tx = self.pool.begin().await?;
        let (tables_written, _) = replace_payload_rows(&mut tx, WORLD_TABLE, &table_rows).await?;
        let (relations_written, _) = replace_payload_rows(&mut tx, WORLD_RELATION_TABLE, &relation_rows).await?;
        tx.commit().await?;
        tracing::info!(tables_written, relations_written, "catalog persisted");
        Ok(())
    }

    async fn write_definitions(&self, machines: &[StateMachineConfig], actions: &[ActionConfig]) -> Result<(), AppError> {
        persist_definitions(&self.pool, STATE_MACHINE_TABLE, machines, |m| m.name.clone()).await?;
        persist_definitions(&self.pool, ACTION_TABLE, actions, |a| format!("{}:{}", a.entity_type, a.name)).await?;
        Ok(())
    }
}

/// Store definitions keyed by name (state machines, actions) for inspection by clients and operators.
pub async fn persist_definitions<T, F>(pool: &PgPool, table: &str, items: &[T], id_of: F) -> Result<u64, AppError>
where
    T: serde::Serialize,
    F: Fn(&T) -> String,
{
    let mut rows = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        rows.push(PayloadRow {
            id: id_of(item),
            position: i as i64,
            payload: to_payload(item)?,
        });
    }
    persist_rows(pool, table, &rows).await
}

pub async fn get_site_content(pool: &PgPool, site: &str, path: &str) -> Result<Option<String>, AppError> {
    let sql = format!(
        "SELECT content FROM {} WHERE site = $1 AND path = $2",
        qualified_sys_table(SITE_CONTENT_TABLE)
    );
    let row: Option<(String,)> = sqlx::query_as(&sql).bind(site).bind(path).fetch_optional(pool).await?;
    Ok(row.map(|r| r.0))
}

pub async fn put_site_content(pool: &PgPool, site: &str, path: &str, content: &str) -> Result<(), AppError> {
    let sql = format!(
        r#"
        INSERT INTO {} (site, path, content, updated_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (site, path)
        DO UPDATE SET content = $3, updated_at = NOW()
        "#,
        qualified_sys_table(SITE_CONTENT_TABLE)
    );
    sqlx::query(&sql).bind(site).bind(path).bind(content).execute(pool).await?;
    Ok(())
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = format!("{}postgres", base);
    Ok((admin_url, db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
