//! Generic CRUD execution against PostgreSQL.

use crate::error::AppError;
use crate::registry::{Resource, ResourceRegistry};
use crate::service::store::{resolve_includes, ListQuery, ResourceStore};
use crate::sql::{delete, insert, select_by_id, select_list, select_list_with_includes, update, IncludeSelect, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;

#[derive(Clone)]
pub struct CrudService {
    pool: PgPool,
}

impl CrudService {
    pub fn new(pool: PgPool) -> Self {
        CrudService { pool }
    }

    async fn query_many(&self, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn query_optional(&self, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_json(&r)))
    }
}

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const NOT_NULL_VIOLATION: &str = "23502";
const CHECK_VIOLATION: &str = "23514";
const STRING_TOO_LONG: &str = "22001";
const INVALID_TEXT_REPRESENTATION: &str = "22P02";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Write {
    Insert,
    Update,
    Delete,
}

/// Client-caused constraint failures by SQLSTATE. `None` leaves the error a database error.
fn classify(code: &str, message: &str, write: Write) -> Option<AppError> {
    match code {
        UNIQUE_VIOLATION => Some(AppError::Conflict(message.to_string())),
        FOREIGN_KEY_VIOLATION if write == Write::Delete => {
            Some(AppError::Conflict(format!("row is still referenced: {}", message)))
        }
        FOREIGN_KEY_VIOLATION | NOT_NULL_VIOLATION | CHECK_VIOLATION | STRING_TOO_LONG
        | INVALID_TEXT_REPRESENTATION => Some(AppError::Validation(message.to_string())),
        _ => None,
    }
}

fn write_error(e: AppError, write: Write) -> AppError {
    let AppError::Db(db) = e else {
        return e;
    };
    let classified = db
        .as_database_error()
        .and_then(|d| d.code().and_then(|code| classify(&code, d.message(), write)));
    match classified {
        Some(app) => {
            tracing::debug!(error = %db, "write rejected by constraint");
            app
        }
        None => AppError::Db(db),
    }
}

#[async_trait]
impl ResourceStore for CrudService {
    async fn list(
        &self,
        registry: &ResourceRegistry,
        resource: &Resource,
        query: &ListQuery,
    ) -> Result<Vec<Value>, AppError> {
        if query.include.is_empty() {
            let q = select_list(resource, &query.filters, query.limit(), query.offset());
            return self.query_many(&q).await;
        }
        let resolved = resolve_includes(registry, resource, &query.include)?;
        let includes: Vec<IncludeSelect<'_>> = resolved
            .iter()
            .map(|(spec, related)| IncludeSelect {
                name: &spec.name,
                direction: spec.direction,
                related,
                our_key: &spec.our_key_column,
                their_key: &spec.their_key_column,
            })
            .collect();
        let q = select_list_with_includes(resource, &query.filters, query.limit(), query.offset(), &includes);
        self.query_many(&q).await
    }

    async fn read(&self, resource: &Resource, id: &Value) -> Result<Option<Value>, AppError> {
        self.query_optional(&select_by_id(resource, id)).await
    }

    async fn create(&self, resource: &Resource, body: &Map<String, Value>) -> Result<Value, AppError> {
        let q = insert(resource, body);
        match self.query_optional(&q).await {
            Ok(Some(row)) => Ok(row),
            Ok(None) => Err(AppError::Db(sqlx::Error::RowNotFound)),
            Err(e) => Err(write_error(e, Write::Insert)),
        }
    }

    async fn update(
        &self,
        resource: &Resource,
        id: &Value,
        body: &Map<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        self.query_optional(&update(resource, id, body))
            .await
            .map_err(|e| write_error(e, Write::Update))
    }

    async fn delete(&self, resource: &Resource, id: &Value) -> Result<Option<Value>, AppError> {
        self.query_optional(&delete(resource, id))
            .await
            .map_err(|e| write_error(e, Write::Delete))
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

fn row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
