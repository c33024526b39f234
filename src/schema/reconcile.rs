//! Merge declared tables into the tables already recorded in the catalog.
//!
//! The merge is append-only: existing columns keep their order and definition, declared columns
//! that are not present yet go to the tail, relations are unioned by identity. Anything that
//! would need an edit or a drop is reported as a [`ReconciliationConflict`] and skipped.

use crate::schema::model::{TableDefinition, UnifiedSchema};
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconciliationConflict {
    /// Declared column differs from the stored one. Schema evolution is additive-only.
    ColumnEdit { table: String, column: String },
    /// The same table name appeared twice in one input set; the copies were merged.
    DuplicateTable { table: String },
    /// Relation points at a table that is not part of the unified schema.
    UnknownRelationTarget { table: String, target: String },
}

impl fmt::Display for ReconciliationConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconciliationConflict::ColumnEdit { table, column } => write!(
                f,
                "column {}.{} differs from the stored definition; edits are not applied",
                table, column
            ),
            ReconciliationConflict::DuplicateTable { table } => {
                write!(f, "table {} declared more than once; definitions merged", table)
            }
            ReconciliationConflict::UnknownRelationTarget { table, target } => {
                write!(f, "relation {} -> {} targets an unknown table; skipped", table, target)
            }
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Clone, Debug, Default)]
pub struct Reconciliation {
    pub schema: UnifiedSchema,
    pub conflicts: Vec<ReconciliationConflict>,
    /// Existing tables that received declared additions.
    pub modified: Vec<String>,
    /// Declared tables with no existing counterpart.
    pub created: Vec<String>,
}

/// Merge `declared` into `existing`. Never fails; every name in either input appears exactly once.
pub fn reconcile(declared: &[TableDefinition], existing: &[TableDefinition]) -> Reconciliation {
    let mut out = Reconciliation::default();
    let mut tables: Vec<TableDefinition> = Vec::with_capacity(existing.len() + declared.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for table in existing {
        match index.get(&table.name) {
            Some(&i) => {
                record(&mut out.conflicts, ReconciliationConflict::DuplicateTable {
                    table: table.name.clone(),
                });
                merge_into(&mut tables[i], table, &mut out.conflicts);
            }
            None => {
                index.insert(table.name.clone(), tables.len());
                tables.push(table.clone());
            }
        }
    }
    let existing_count = tables.len();

    for table in declared {
        match index.get(&table.name) {
            Some(&i) => {
                if i < existing_count {
                    if !out.modified.contains(&table.name) {
                        tracing::info!(table = %table.name, "table is being modified");
                        out.modified.push(table.name.clone());
                    }
                } else {
                    record(&mut out.conflicts, ReconciliationConflict::DuplicateTable {
                        table: table.name.clone(),
                    });
                }
                merge_into(&mut tables[i], table, &mut out.conflicts);
            }
            None => {
                tracing::info!(table = %table.name, "new table");
                index.insert(table.name.clone(), tables.len());
                out.created.push(table.name.clone());
                tables.push(table.clone());
            }
        }
    }

    out.schema = UnifiedSchema::new(tables);
    out
}

fn merge_into(target: &mut TableDefinition, incoming: &TableDefinition, conflicts: &mut Vec<ReconciliationConflict>) {
    for column in &incoming.columns {
        match target.column(&column.name) {
            Some(current) if current == column => {}
            Some(_) => record(conflicts, ReconciliationConflict::ColumnEdit {
                table: target.name.clone(),
                column: column.name.clone(),
            }),
            None => target.columns.push(column.clone()),
        }
    }
    for relation in &incoming.relations {
        if target.relations.iter().any(|r| r.same_identity(relation)) {
            tracing::debug!(table = %target.name, object = %relation.object, "relation already present");
            continue;
        }
        target.relations.push(relation.clone());
    }
    for set in &incoming.unique {
        if !target.unique.contains(set) {
            target.unique.push(set.clone());
        }
    }
}

pub(crate) fn record(conflicts: &mut Vec<ReconciliationConflict>, conflict: ReconciliationConflict) {
    tracing::warn!(conflict = %conflict, "reconciliation conflict");
    conflicts.push(conflict);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::model::{ColumnDefinition, ColumnType, RelationKind};

    fn col(name: &str) -> ColumnDefinition {
        ColumnDefinition::new(name, ColumnType::Text)
    }

    fn names(t: &TableDefinition) -> Vec<&str> {
        t.columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn order_gains_status_and_customer_relation() {
        let existing = vec![TableDefinition::new("order").with_columns(vec![
            ColumnDefinition::new("id", ColumnType::Bigint),
            ColumnDefinition::new("amount", ColumnType::Measurement),
        ])];
        let declared = vec![TableDefinition::new("order")
            .with_columns(vec![col("status")])
            .with_relation(RelationKind::ManyToOne, "customer")];

        let r = reconcile(&declared, &existing);
        let order = r.schema.table("order").unwrap();
        assert_eq!(names(order), vec!["id", "amount", "status"]);
        assert_eq!(order.relations.len(), 1);
        assert_eq!(order.relations[0].object, "customer");
        assert_eq!(r.modified, vec!["order".to_string()]);
        assert!(r.conflicts.is_empty());
    }

    #[test]
    fn column_edit_is_reported_not_applied() {
        let existing = vec![TableDefinition::new("order").with_columns(vec![col("amount")])];
        let declared = vec![TableDefinition::new("order")
            .with_columns(vec![ColumnDefinition::new("amount", ColumnType::Measurement)])];
        let r = reconcile(&declared, &existing);
        assert_eq!(r.schema.table("order").unwrap().columns[0].column_type, ColumnType::Text);
        assert_eq!(
            r.conflicts,
            vec![ReconciliationConflict::ColumnEdit {
                table: "order".into(),
                column: "amount".into()
            }]
        );
    }

    #[test]
    fn repeated_boots_do_not_accumulate_relations() {
        let declared = vec![TableDefinition::new("order").with_relation(RelationKind::ManyToOne, "customer")];
        let first = reconcile(&declared, &[]);
        let second = reconcile(&declared, &first.schema.tables);
        let third = reconcile(&declared, &second.schema.tables);
        assert_eq!(third.schema.table("order").unwrap().relations.len(), 1);
        assert_eq!(first.schema, third.schema);
    }

    #[test]
    fn unmatched_tables_pass_through_in_order() {
        let existing = vec![TableDefinition::new("a"), TableDefinition::new("b")];
        let declared = vec![TableDefinition::new("c"), TableDefinition::new("a")];
        let r = reconcile(&declared, &existing);
        assert_eq!(r.schema.table_names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(r.created, vec!["c".to_string()]);
    }

    #[test]
    fn duplicate_declared_tables_merge() {
        let declared = vec![
            TableDefinition::new("a").with_columns(vec![col("x")]),
            TableDefinition::new("a").with_columns(vec![col("y")]),
        ];
        let r = reconcile(&declared, &[]);
        assert_eq!(r.schema.tables.len(), 1);
        assert_eq!(names(&r.schema.tables[0]), vec!["x", "y"]);
        assert!(matches!(r.conflicts[0], ReconciliationConflict::DuplicateTable { .. }));
    }
}
