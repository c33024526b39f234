//! Relation validation and expansion into concrete columns and join tables.

use crate::schema::model::{
    foreign_key_column, ColumnDefinition, ColumnType, RelationDefinition, RelationKind, TableDefinition,
    UnifiedSchema,
};
use crate::schema::reconcile::{record, ReconciliationConflict};
use std::collections::{HashMap, HashSet};

/// Column `table.column` references `references.references_column`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub references: String,
    pub references_column: String,
}

impl ForeignKey {
    pub fn constraint_name(&self) -> String {
        format!("fk_{}_{}", self.table, self.column)
    }
}

/// Column names of a many-to-many join table: (subject side, object side).
pub fn join_columns(relation: &RelationDefinition) -> (String, String) {
    let subject_col = foreign_key_column(&relation.subject);
    let object_col = foreign_key_column(&relation.object);
    if subject_col == object_col {
        (subject_col, format!("related_{}", object_col))
    } else {
        (subject_col, object_col)
    }
}

fn key_column_name(table: Option<&TableDefinition>) -> String {
    table
        .and_then(|t| t.primary_key())
        .map(|c| c.name.clone())
        .unwrap_or_else(|| "id".to_string())
}

pub struct RelationManager;

impl RelationManager {
    /// Drop relations whose target is unknown, then add the foreign-key columns and join tables
    /// the remaining relations need. Running it again on its own output changes nothing.
    pub fn expand(schema: &mut UnifiedSchema) -> Vec<ReconciliationConflict> {
        let mut conflicts = Vec::new();
        let known: HashSet<String> = schema.table_names().map(String::from).collect();

        for table in &mut schema.tables {
            let name = table.name.clone();
            table.relations.retain(|r| {
                if known.contains(&r.object) {
                    true
                } else {
                    record(&mut conflicts, ReconciliationConflict::UnknownRelationTarget {
                        table: name.clone(),
                        target: r.object.clone(),
                    });
                    false
                }
            });
        }

        let key_types: HashMap<String, ColumnType> =
            schema.tables.iter().map(|t| (t.name.clone(), t.key_type())).collect();
        let mut new_columns: Vec<(String, ColumnDefinition)> = Vec::new();
        let mut join_tables: Vec<TableDefinition> = Vec::new();
        for table in &mut schema.tables {
            for rel in &mut table.relations {
                match rel.kind {
                    RelationKind::ManyToOne => {
                        new_columns.push((rel.subject.clone(), reference_column(&rel.object, &key_types)));
                    }
                    RelationKind::OneToMany => {
                        new_columns.push((rel.object.clone(), reference_column(&rel.subject, &key_types)));
                    }
                    RelationKind::ManyToMany => {
                        let join_name = rel.join_table_name();
                        rel.join_table = Some(join_name.clone());
                        let (subject_col, object_col) = join_columns(rel);
                        let mut a = reference_column(&rel.subject, &key_types);
                        a.name = subject_col.clone();
                        a.nullable = false;
                        let mut b = reference_column(&rel.object, &key_types);
                        b.name = object_col.clone();
                        b.nullable = false;
                        let mut join = TableDefinition::new(join_name).with_columns(vec![a, b]);
                        join.unique.push(vec![subject_col, object_col]);
                        join_tables.push(join);
                    }
                }
            }
        }

        for (table_name, column) in new_columns {
            if let Some(table) = schema.tables.iter_mut().find(|t| t.name == table_name) {
                if !table.has_column(&column.name) {
                    tracing::debug!(table = %table_name, column = %column.name, "adding relation column");
                    table.columns.push(column);
                }
            }
        }

        for join in join_tables {
            if schema.table(&join.name).is_some() {
                continue;
            }
            tracing::info!(table = %join.name, "adding join table");
            schema.tables.push(join);
        }

        conflicts
    }

    /// Foreign keys implied by the relations of an expanded schema, in table order.
    pub fn foreign_keys(schema: &UnifiedSchema) -> Vec<ForeignKey> {
        let mut out: Vec<ForeignKey> = Vec::new();
        let mut push = |fk: ForeignKey| {
            if !out.contains(&fk) {
                out.push(fk);
            }
        };
        for table in &schema.tables {
            for rel in &table.relations {
                match rel.kind {
                    RelationKind::ManyToOne => push(ForeignKey {
                        table: rel.subject.clone(),
                        column: foreign_key_column(&rel.object),
                        references: rel.object.clone(),
                        references_column: key_column_name(schema.table(&rel.object)),
                    }),
                    RelationKind::OneToMany => push(ForeignKey {
                        table: rel.object.clone(),
                        column: foreign_key_column(&rel.subject),
                        references: rel.subject.clone(),
                        references_column: key_column_name(schema.table(&rel.subject)),
                    }),
                    RelationKind::ManyToMany => {
                        let join = rel.join_table.clone().unwrap_or_else(|| rel.join_table_name());
                        let (subject_col, object_col) = join_columns(rel);
                        push(ForeignKey {
                            table: join.clone(),
                            column: subject_col,
                            references: rel.subject.clone(),
                            references_column: key_column_name(schema.table(&rel.subject)),
                        });
                        push(ForeignKey {
                            table: join,
                            column: object_col,
                            references: rel.object.clone(),
                            references_column: key_column_name(schema.table(&rel.object)),
                        });
                    }
                }
            }
        }
        out
    }
}

fn reference_column(table: &str, key_types: &HashMap<String, ColumnType>) -> ColumnDefinition {
    let key_type = key_types.get(table).copied().unwrap_or(ColumnType::Bigint);
    let mut column = ColumnDefinition::new(foreign_key_column(table), key_type);
    column.indexed = true;
    column
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> UnifiedSchema {
        UnifiedSchema::new(vec![
            TableDefinition::new("order")
                .with_relation(RelationKind::ManyToOne, "customer")
                .with_relation(RelationKind::ManyToMany, "tag"),
            TableDefinition::new("customer").with_relation(RelationKind::OneToMany, "note"),
            TableDefinition::new("tag"),
            TableDefinition::new("note"),
        ])
    }

    #[test]
    fn expansion_adds_columns_and_join_table() {
        let mut s = schema();
        let conflicts = RelationManager::expand(&mut s);
        assert!(conflicts.is_empty());
        let order = s.table("order").unwrap();
        assert!(order.column("customer_id").unwrap().indexed);
        assert!(s.table("note").unwrap().has_column("customer_id"));
        let join = s.table("order_order_id_has_tag_tag_id").unwrap();
        assert_eq!(join.columns.len(), 2);
        assert_eq!(join.unique, vec![vec!["order_id".to_string(), "tag_id".to_string()]]);
        assert_eq!(
            order.relations[1].join_table.as_deref(),
            Some("order_order_id_has_tag_tag_id")
        );
    }

    #[test]
    fn expansion_is_a_fixed_point() {
        let mut once = schema();
        RelationManager::expand(&mut once);
        let mut twice = once.clone();
        RelationManager::expand(&mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_target_is_dropped_with_conflict() {
        let mut s = UnifiedSchema::new(vec![TableDefinition::new("order").with_relation(RelationKind::ManyToOne, "ghost")]);
        let conflicts = RelationManager::expand(&mut s);
        assert_eq!(conflicts.len(), 1);
        assert!(s.table("order").unwrap().relations.is_empty());
        assert!(!s.table("order").unwrap().has_column("ghost_id"));
    }

    #[test]
    fn reference_column_takes_target_key_type() {
        let mut pk = ColumnDefinition::new("code", ColumnType::Uuid);
        pk.primary_key = true;
        let mut s = UnifiedSchema::new(vec![
            TableDefinition::new("order").with_relation(RelationKind::ManyToOne, "customer"),
            TableDefinition::new("customer").with_columns(vec![pk]),
        ]);
        RelationManager::expand(&mut s);
        assert_eq!(s.table("order").unwrap().column("customer_id").unwrap().column_type, ColumnType::Uuid);
        let fks = RelationManager::foreign_keys(&s);
        assert_eq!(fks[0].references_column, "code");
    }

    #[test]
    fn foreign_keys_cover_every_relation_kind() {
        let mut s = schema();
        RelationManager::expand(&mut s);
        let fks = RelationManager::foreign_keys(&s);
        let tables: Vec<&str> = fks.iter().map(|f| f.table.as_str()).collect();
        assert_eq!(
            tables,
            vec!["order", "order_order_id_has_tag_tag_id", "order_order_id_has_tag_tag_id", "note"]
        );
    }
}
