//! Reconciliation properties over generated declared/existing table sets.

use goms::schema::{reconcile, ColumnDefinition, ColumnType, RelationKind, TableDefinition};
use proptest::prelude::*;
use std::collections::BTreeSet;

const NAMES: &[&str] = &["customer", "order", "item", "invoice"];
const COLUMNS: &[&str] = &["name", "email", "total", "note", "placed_at"];
const TYPES: &[ColumnType] = &[ColumnType::Label, ColumnType::Text, ColumnType::Bigint, ColumnType::Datetime];
const KINDS: &[RelationKind] = &[RelationKind::OneToMany, RelationKind::ManyToOne, RelationKind::ManyToMany];

fn column() -> impl Strategy<Value = ColumnDefinition> {
    (prop::sample::select(COLUMNS), prop::sample::select(TYPES), any::<bool>()).prop_map(|(name, t, nullable)| {
        let mut c = ColumnDefinition::new(name, t);
        c.nullable = nullable;
        c
    })
}

fn table() -> impl Strategy<Value = TableDefinition> {
    (
        prop::sample::select(NAMES),
        prop::collection::vec(column(), 0..4),
        prop::collection::vec((prop::sample::select(KINDS), prop::sample::select(NAMES)), 0..3),
    )
        .prop_map(|(name, columns, relations)| {
            let mut seen = BTreeSet::new();
            let columns = columns.into_iter().filter(|c| seen.insert(c.name.clone())).collect();
            let mut t = TableDefinition::new(name).with_columns(columns);
            for (kind, object) in relations {
                t = t.with_relation(kind, object);
            }
            t
        })
}

fn tables() -> impl Strategy<Value = Vec<TableDefinition>> {
    prop::collection::vec(table(), 0..5)
}

proptest! {
    #[test]
    fn every_name_appears_exactly_once(declared in tables(), existing in tables()) {
        let out = reconcile(&declared, &existing);
        let expected: BTreeSet<&str> = declared.iter().chain(existing.iter()).map(|t| t.name.as_str()).collect();
        let names: Vec<&str> = out.schema.tables.iter().map(|t| t.name.as_str()).collect();
        let unique: BTreeSet<&str> = names.iter().copied().collect();
        prop_assert_eq!(names.len(), unique.len());
        prop_assert_eq!(unique, expected);
    }

    #[test]
    fn merge_never_removes_existing_columns(declared in tables(), existing in tables()) {
        let out = reconcile(&declared, &existing);
        for e in &existing {
            let merged = out.schema.table(&e.name).unwrap();
            for c in &e.columns {
                prop_assert!(merged.has_column(&c.name));
            }
            for r in &e.relations {
                prop_assert!(merged.relations.iter().any(|m| m.same_identity(r)));
            }
        }
    }

    #[test]
    fn reconciling_again_changes_nothing(declared in tables(), existing in tables()) {
        let first = reconcile(&declared, &existing).schema;
        let second = reconcile(&declared, &first.tables);
        prop_assert_eq!(&second.schema, &first);
        prop_assert!(second.created.is_empty());
    }
}

#[test]
fn repeated_relations_do_not_accumulate() {
    let declared = vec![TableDefinition::new("order").with_relation(RelationKind::ManyToOne, "customer")];
    let mut existing = declared.clone();
    for _ in 0..3 {
        existing = reconcile(&declared, &existing).schema.tables;
    }
    assert_eq!(existing[0].relations.len(), 1);
}
