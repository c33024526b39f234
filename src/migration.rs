//! Materialize the unified schema: tables and added columns, then foreign keys, then unique
//! constraints, then indexes. Every statement is idempotent and applied best-effort: a failed
//! item is logged and the remaining items still run.

use crate::error::AppError;
use crate::schema::{ColumnDefinition, ColumnType, RelationManager, TableDefinition, UnifiedSchema};
use async_trait::async_trait;
use sqlx::PgPool;

/// PostgreSQL truncates identifiers past this length.
const MAX_IDENT_LEN: usize = 63;

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote(schema), quote(table))
}

/// Constraint/index names longer than PostgreSQL allows get a stable hash suffix.
fn bounded_name(name: String) -> String {
    if name.len() <= MAX_IDENT_LEN {
        return name;
    }
    let mut hash: u32 = 0x811c_9dc5;
    for b in name.bytes() {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    let mut cut = MAX_IDENT_LEN - 9;
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}_{:08x}", &name[..cut], hash)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DdlStage {
    Tables,
    Relations,
    UniqueConstraints,
    Indexes,
}

#[derive(Clone, Debug)]
pub struct DdlStep {
    pub stage: DdlStage,
    /// What the statement creates, for logs and reports.
    pub target: String,
    pub sql: String,
}

#[derive(Clone, Debug, Default)]
pub struct MigrationPlan {
    pub steps: Vec<DdlStep>,
}

#[derive(Clone, Debug, Default)]
pub struct MaterializeReport {
    pub applied: usize,
    /// (target, error message) per failed item.
    pub failed: Vec<(String, String)>,
}

/// Runs one DDL statement.
#[async_trait]
pub trait DdlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<(), AppError>;
}

#[async_trait]
impl DdlExecutor for PgPool {
    async fn execute(&self, sql: &str) -> Result<(), AppError> {
        tracing::debug!(sql = %sql, "ddl");
        sqlx::query(sql).execute(self).await?;
        Ok(())
    }
}

/// Accepts every statement without running it; for stores that keep no DDL-defined tables.
pub struct DiscardDdl;

#[async_trait]
impl DdlExecutor for DiscardDdl {
    async fn execute(&self, sql: &str) -> Result<(), AppError> {
        tracing::debug!(sql = %sql, "ddl discarded");
        Ok(())
    }
}

fn serial_for(column: &ColumnDefinition) -> Option<&'static str> {
    if column.default.is_some() {
        return None;
    }
    match column.column_type {
        ColumnType::Bigint => Some("BIGSERIAL"),
        ColumnType::Integer => Some("SERIAL"),
        _ => None,
    }
}

fn column_sql(column: &ColumnDefinition) -> String {
    let mut def = format!("{} {}", quote(&column.name), column.column_type.pg_type());
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(ref d) = column.default {
        def.push_str(" DEFAULT ");
        def.push_str(d);
    }
    def
}

fn primary_key_sql(table: &TableDefinition) -> String {
    match table.primary_key() {
        None => format!("{} BIGSERIAL PRIMARY KEY", quote("id")),
        Some(pk) => match serial_for(pk) {
            Some(serial) => format!("{} {} PRIMARY KEY", quote(&pk.name), serial),
            None if pk.column_type == ColumnType::Uuid && pk.default.is_none() => format!(
                "{} uuid PRIMARY KEY DEFAULT gen_random_uuid()",
                quote(&pk.name)
            ),
            None => format!("{} PRIMARY KEY", column_sql(pk)),
        },
    }
}

fn guarded_constraint(name: &str, alter: String) -> String {
    format!(
        "DO $$ BEGIN IF NOT EXISTS (SELECT 1 FROM pg_constraint WHERE conname = {}) THEN {}; END IF; END $$",
        literal(name),
        alter
    )
}

/// Build the ordered DDL for `schema`; data tables live in `data_schema`.
pub fn plan(schema: &UnifiedSchema, data_schema: &str) -> MigrationPlan {
    let mut steps = Vec::new();
    steps.push(DdlStep {
        stage: DdlStage::Tables,
        target: data_schema.to_string(),
        sql: format!("CREATE SCHEMA IF NOT EXISTS {}", quote(data_schema)),
    });

    for table in &schema.tables {
        let full = qualified(data_schema, &table.name);
        let pk_name = table.primary_key().map(|c| c.name.as_str());
        let mut defs = vec![primary_key_sql(table)];
        for column in &table.columns {
            if Some(column.name.as_str()) != pk_name {
                defs.push(column_sql(column));
            }
        }
        for (name, suffix) in [
            ("created_at", "TIMESTAMPTZ NOT NULL DEFAULT NOW()"),
            ("updated_at", "TIMESTAMPTZ NOT NULL DEFAULT NOW()"),
        ] {
            if !table.has_column(name) {
                defs.push(format!("{} {}", quote(name), suffix));
            }
        }
        steps.push(DdlStep {
            stage: DdlStage::Tables,
            target: table.name.clone(),
            sql: format!("CREATE TABLE IF NOT EXISTS {} (\n  {}\n)", full, defs.join(",\n  ")),
        });
        for column in &table.columns {
            if Some(column.name.as_str()) == pk_name {
                continue;
            }
            steps.push(DdlStep {
                stage: DdlStage::Tables,
                target: format!("{}.{}", table.name, column.name),
                sql: format!("ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}", full, column_sql(column)),
            });
        }
    }

    for fk in RelationManager::foreign_keys(schema) {
        let nullable = schema
            .table(&fk.table)
            .and_then(|t| t.column(&fk.column))
            .map(|c| c.nullable)
            .unwrap_or(true);
        let on_delete = if nullable { "SET NULL" } else { "CASCADE" };
        let name = bounded_name(fk.constraint_name());
        let alter = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
            qualified(data_schema, &fk.table),
            quote(&name),
            quote(&fk.column),
            qualified(data_schema, &fk.references),
            quote(&fk.references_column),
            on_delete
        );
        steps.push(DdlStep {
            stage: DdlStage::Relations,
            target: name.clone(),
            sql: guarded_constraint(&name, alter),
        });
    }

    for table in &schema.tables {
        let full = qualified(data_schema, &table.name);
        let mut sets: Vec<Vec<String>> = table
            .columns
            .iter()
            .filter(|c| c.unique && !c.primary_key)
            .map(|c| vec![c.name.clone()])
            .collect();
        for set in &table.unique {
            if !sets.contains(set) {
                sets.push(set.clone());
            }
        }
        for set in sets {
            let name = bounded_name(format!("uq_{}_{}", table.name, set.join("_")));
            let cols: Vec<String> = set.iter().map(|c| quote(c)).collect();
            let alter = format!(
                "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
                full,
                quote(&name),
                cols.join(", ")
            );
            steps.push(DdlStep {
                stage: DdlStage::UniqueConstraints,
                target: name.clone(),
                sql: guarded_constraint(&name, alter),
            });
        }
    }

    for table in &schema.tables {
        let full = qualified(data_schema, &table.name);
        for column in table.columns.iter().filter(|c| c.indexed && !c.unique && !c.primary_key) {
            let name = bounded_name(format!("idx_{}_{}", table.name, column.name));
            steps.push(DdlStep {
                stage: DdlStage::Indexes,
                target: name.clone(),
                sql: format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    quote(&name),
                    full,
                    quote(&column.name)
                ),
            });
        }
    }

    MigrationPlan { steps }
}

/// Execute every step in order. Failures are collected, never propagated.
pub async fn apply_plan(executor: &dyn DdlExecutor, plan: &MigrationPlan) -> MaterializeReport {
    let mut report = MaterializeReport::default();
    for step in &plan.steps {
        match executor.execute(&step.sql).await {
            Ok(()) => report.applied += 1,
            Err(e) => {
                tracing::warn!(stage = ?step.stage, target = %step.target, error = %e, "ddl step failed");
                report.failed.push((step.target.clone(), e.to_string()));
            }
        }
    }
    tracing::info!(applied = report.applied, failed = report.failed.len(), "schema materialized");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RelationKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        statements: Mutex<Vec<String>>,
        fail_containing: Option<&'static str>,
    }

    #[async_trait]
    impl DdlExecutor for Recorder {
        async fn execute(&self, sql: &str) -> Result<(), AppError> {
            self.statements.lock().unwrap().push(sql.to_string());
            match self.fail_containing {
                Some(needle) if sql.contains(needle) => Err(AppError::BadRequest("boom".into())),
                _ => Ok(()),
            }
        }
    }

    fn schema() -> UnifiedSchema {
        let mut email = ColumnDefinition::new("email", ColumnType::Email);
        email.unique = true;
        let mut s = UnifiedSchema::new(vec![
            TableDefinition::new("order").with_relation(RelationKind::ManyToMany, "customer"),
            TableDefinition::new("customer").with_columns(vec![email]),
        ]);
        RelationManager::expand(&mut s);
        s
    }

    #[test]
    fn stages_are_ordered() {
        let p = plan(&schema(), "public");
        let stages: Vec<DdlStage> = p.steps.iter().map(|s| s.stage).collect();
        let mut sorted = stages.clone();
        sorted.sort();
        assert_eq!(stages, sorted);
        assert!(stages.contains(&DdlStage::Relations));
        assert!(stages.contains(&DdlStage::UniqueConstraints));
        assert!(stages.contains(&DdlStage::Indexes));
    }

    #[test]
    fn implicit_id_and_timestamps() {
        let p = plan(&schema(), "public");
        let create = p
            .steps
            .iter()
            .find(|s| s.target == "customer" && s.stage == DdlStage::Tables)
            .unwrap();
        assert!(create.sql.contains("\"id\" BIGSERIAL PRIMARY KEY"));
        assert!(create.sql.contains("\"created_at\" TIMESTAMPTZ"));
        assert!(create.sql.starts_with("CREATE TABLE IF NOT EXISTS \"public\".\"customer\""));
    }

    #[test]
    fn long_names_are_bounded_and_stable() {
        let long = "uq_".to_string() + &"x".repeat(80);
        let a = bounded_name(long.clone());
        assert_eq!(a.len(), MAX_IDENT_LEN);
        assert_eq!(a, bounded_name(long));
        assert_eq!(bounded_name("idx_a_b".into()), "idx_a_b");
    }

    #[tokio::test]
    async fn failed_step_does_not_stop_the_rest() {
        let p = plan(&schema(), "public");
        let recorder = Recorder {
            fail_containing: Some("FOREIGN KEY"),
            ..Default::default()
        };
        let report = apply_plan(&recorder, &p).await;
        assert_eq!(recorder.statements.lock().unwrap().len(), p.steps.len());
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.applied, p.steps.len() - 2);
    }
}
