//! Builds parameterized INSERT, SELECT, UPDATE, DELETE for a registry resource.
//! Every placeholder is cast to the column's type; values are bound as text.

use crate::registry::{IncludeDirection, Resource};
use crate::schema::ColumnType;
use serde_json::{Map, Value};

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;

/// One include for a single-query list: the `IncludeSpec` plus the related resource it points at.
pub struct IncludeSelect<'a> {
    pub name: &'a str,
    pub direction: IncludeDirection,
    pub related: &'a Resource,
    pub our_key: &'a str,
    pub their_key: &'a str,
}

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn qualified_table(resource: &Resource) -> String {
    format!("{}.{}", quoted(&resource.schema_name), quoted(&resource.name))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        Self::default()
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Push `v` and return its placeholder cast to `column`'s type.
    fn placeholder(&mut self, resource: &Resource, column: &str, v: Value) -> String {
        let info = resource.column(column);
        // jsonb takes the document text; a bare string would otherwise be parsed as JSON.
        let v = match (info.map(|c| c.column_type), v) {
            (Some(ColumnType::Json), Value::Null) => Value::Null,
            (Some(ColumnType::Json), doc) => Value::String(doc.to_string()),
            (_, v) => v,
        };
        let n = self.push_param(v);
        match info {
            Some(c) => format!("${}::{}", n, c.pg_type()),
            None => format!("${}", n),
        }
    }
}

/// Column expression; numeric is read back as text since it has no lossless JSON form.
fn column_expr(resource: &Resource, name: &str, alias: Option<&str>) -> String {
    let q = quoted(name);
    let base = match alias {
        Some(a) => format!("{}.{}", a, q),
        None => q,
    };
    match resource.column(name).map(|c| c.pg_type()) {
        Some("numeric") => format!("{}::text", base),
        _ => base,
    }
}

fn select_column_list(resource: &Resource) -> String {
    resource
        .columns
        .iter()
        .map(|c| {
            let expr = column_expr(resource, &c.name, None);
            if expr == quoted(&c.name) {
                expr
            } else {
                format!("{} AS {}", expr, quoted(&c.name))
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// SELECT by primary key. The id is the sole param.
pub fn select_by_id(resource: &Resource, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(resource, &resource.pk_column, id.clone());
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        select_column_list(resource),
        qualified_table(resource),
        quoted(&resource.pk_column),
        ph
    );
    q
}

fn where_clause(q: &mut QueryBuf, resource: &Resource, filters: &[(String, Value)], alias: Option<&str>) -> String {
    let mut parts = Vec::new();
    for (col, val) in filters {
        if resource.column(col).is_none() {
            continue;
        }
        let ph = q.placeholder(resource, col, val.clone());
        let lhs = match alias {
            Some(a) => format!("{}.{}", a, quoted(col)),
            None => quoted(col),
        };
        parts.push(format!("{} = {}", lhs, ph));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// SELECT list with exact-match filters, ORDER BY pk, LIMIT/OFFSET. Unknown filter columns are ignored.
pub fn select_list(resource: &Resource, filters: &[(String, Value)], limit: u32, offset: u32) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, resource, filters, None);
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
        select_column_list(resource),
        qualified_table(resource),
        where_sql,
        quoted(&resource.pk_column),
        limit.min(MAX_LIMIT),
        offset
    );
    q
}

/// SELECT list with includes in one query: main table aliased as "main", each include as a
/// scalar subquery (json_agg for to_many, row_to_json for to_one).
pub fn select_list_with_includes(
    resource: &Resource,
    filters: &[(String, Value)],
    limit: u32,
    offset: u32,
    includes: &[IncludeSelect<'_>],
) -> QueryBuf {
    const MAIN_ALIAS: &str = "main";
    let mut q = QueryBuf::new();

    let mut select_parts: Vec<String> = resource
        .columns
        .iter()
        .map(|c| format!("{} AS {}", column_expr(resource, &c.name, Some(MAIN_ALIAS)), quoted(&c.name)))
        .collect();
    for inc in includes {
        let sub_from = format!(
            "{} WHERE {} = {}.{}",
            qualified_table(inc.related),
            quoted(inc.their_key),
            MAIN_ALIAS,
            quoted(inc.our_key)
        );
        let rel_cols = select_column_list(inc.related);
        let subquery = match inc.direction {
            IncludeDirection::ToOne => format!("(SELECT row_to_json(sub) FROM (SELECT {} FROM {}) sub)", rel_cols, sub_from),
            IncludeDirection::ToMany => format!(
                "(SELECT COALESCE(json_agg(row_to_json(sub)), '[]'::json) FROM (SELECT {} FROM {}) sub)",
                rel_cols, sub_from
            ),
        };
        select_parts.push(format!("{} AS {}", subquery, quoted(inc.name)));
    }

    let where_sql = where_clause(&mut q, resource, filters, Some(MAIN_ALIAS));
    q.sql = format!(
        "SELECT {} FROM {} {}{} ORDER BY {}.{} LIMIT {} OFFSET {}",
        select_parts.join(", "),
        qualified_table(resource),
        MAIN_ALIAS,
        where_sql,
        MAIN_ALIAS,
        quoted(&resource.pk_column),
        limit.min(MAX_LIMIT),
        offset
    );
    q
}

/// INSERT the body's known columns. Omitted columns with a default are left to the database.
pub fn insert(resource: &Resource, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &resource.columns {
        let val = body.get(&c.name).cloned();
        if val.is_none() && c.has_default {
            continue;
        }
        let ph = q.placeholder(resource, &c.name, val.unwrap_or(Value::Null));
        cols.push(quoted(&c.name));
        placeholders.push(ph);
    }
    let table = qualified_table(resource);
    let returning = select_column_list(resource);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by id: SET only known, non-key columns present in body, and bump `updated_at`.
pub fn update(resource: &Resource, id: &Value, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for (k, v) in body {
        if *k == resource.pk_column || k == "updated_at" || resource.column(k).is_none() {
            continue;
        }
        let ph = q.placeholder(resource, k, v.clone());
        sets.push(format!("{} = {}", quoted(k), ph));
    }
    if resource.column("updated_at").is_some() {
        sets.push(format!("{} = NOW()", quoted("updated_at")));
    }
    let table = qualified_table(resource);
    let returning = select_column_list(resource);
    let id_ph = q.placeholder(resource, &resource.pk_column, id.clone());
    q.sql = if sets.is_empty() {
        format!("SELECT {} FROM {} WHERE {} = {}", returning, table, quoted(&resource.pk_column), id_ph)
    } else {
        format!(
            "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
            table,
            sets.join(", "),
            quoted(&resource.pk_column),
            id_ph,
            returning
        )
    };
    q
}

/// DELETE by id.
pub fn delete(resource: &Resource, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(resource, &resource.pk_column, id.clone());
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        qualified_table(resource),
        quoted(&resource.pk_column),
        ph,
        select_column_list(resource)
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ResourceRegistry;
    use crate::schema::{ColumnDefinition, ColumnType, RelationKind, RelationManager, TableDefinition, UnifiedSchema};
    use serde_json::json;

    fn registry() -> ResourceRegistry {
        let mut schema = UnifiedSchema::new(vec![
            TableDefinition::new("order")
                .with_columns(vec![ColumnDefinition::new("amount", ColumnType::Measurement)])
                .with_relation(RelationKind::ManyToOne, "customer"),
            TableDefinition::new("customer"),
        ]);
        RelationManager::expand(&mut schema);
        ResourceRegistry::build(&schema, "public")
    }

    #[test]
    fn list_filters_known_columns_only() {
        let r = registry();
        let order = r.get("order").unwrap();
        let q = select_list(
            order,
            &[("amount".into(), json!("10")), ("ghost".into(), json!("x"))],
            5000,
            0,
        );
        assert_eq!(q.params, vec![json!("10")]);
        assert!(q.sql.contains("WHERE \"amount\" = $1::numeric"));
        assert!(q.sql.contains("\"amount\"::text AS \"amount\""));
        assert!(q.sql.ends_with("LIMIT 1000 OFFSET 0"));
    }

    #[test]
    fn json_columns_bind_document_text() {
        let schema = UnifiedSchema::new(vec![TableDefinition::new("note").with_columns(vec![
            ColumnDefinition::new("meta", ColumnType::Json),
            ColumnDefinition::new("title", ColumnType::Label),
        ])]);
        let r = ResourceRegistry::build(&schema, "public");
        let note = r.get("note").unwrap();
        let body = json!({"meta": "abc", "title": "abc"}).as_object().cloned().unwrap();
        let q = insert(note, &body);
        assert_eq!(q.params, vec![json!("\"abc\""), json!("abc")]);
        let body = json!({"meta": {"a": 1}}).as_object().cloned().unwrap();
        assert_eq!(insert(note, &body).params[0], json!("{\"a\":1}"));
        let body = json!({"meta": null}).as_object().cloned().unwrap();
        assert_eq!(insert(note, &body).params[0], Value::Null);
    }

    #[test]
    fn insert_skips_defaulted_columns_not_in_body() {
        let r = registry();
        let order = r.get("order").unwrap();
        let body = json!({"amount": 12}).as_object().cloned().unwrap();
        let q = insert(order, &body);
        assert!(q.sql.starts_with("INSERT INTO \"public\".\"order\" (\"amount\", \"customer_id\")"));
        assert_eq!(q.params, vec![json!(12), Value::Null]);
    }

    #[test]
    fn update_binds_id_last() {
        let r = registry();
        let order = r.get("order").unwrap();
        let body = json!({"amount": 3, "id": 9}).as_object().cloned().unwrap();
        let q = update(order, &json!(7), &body);
        assert_eq!(q.params, vec![json!(3), json!(7)]);
        assert!(q.sql.contains("\"updated_at\" = NOW()"));
        assert!(q.sql.contains("WHERE \"id\" = $2::bigint"));
    }

    #[test]
    fn includes_become_subqueries() {
        let r = registry();
        let order = r.get("order").unwrap();
        let spec = order.include("customer").unwrap();
        let includes = [IncludeSelect {
            name: &spec.name,
            direction: spec.direction,
            related: r.get("customer").unwrap(),
            our_key: &spec.our_key_column,
            their_key: &spec.their_key_column,
        }];
        let q = select_list_with_includes(order, &[], 10, 0, &includes);
        assert!(q.sql.contains("row_to_json(sub)"));
        assert!(q.sql.contains("WHERE \"id\" = main.\"customer_id\""));
    }
}
