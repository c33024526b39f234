//! Table, column and relation definitions shared by the reconciler, the catalog and the registry.

use crate::config::{ColumnConfig, TableConfig};
use serde::{Deserialize, Serialize};

/// Semantic column type; each maps to exactly one PostgreSQL type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Label,
    Text,
    Email,
    Integer,
    Bigint,
    Measurement,
    Truefalse,
    Datetime,
    Date,
    Json,
    Uuid,
}

impl ColumnType {
    pub fn pg_type(&self) -> &'static str {
        match self {
            ColumnType::Label => "varchar(255)",
            ColumnType::Text | ColumnType::Email => "text",
            ColumnType::Integer => "integer",
            ColumnType::Bigint => "bigint",
            ColumnType::Measurement => "numeric",
            ColumnType::Truefalse => "boolean",
            ColumnType::Datetime => "timestamptz",
            ColumnType::Date => "date",
            ColumnType::Json => "jsonb",
            ColumnType::Uuid => "uuid",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Label => "label",
            ColumnType::Text => "text",
            ColumnType::Email => "email",
            ColumnType::Integer => "integer",
            ColumnType::Bigint => "bigint",
            ColumnType::Measurement => "measurement",
            ColumnType::Truefalse => "truefalse",
            ColumnType::Datetime => "datetime",
            ColumnType::Date => "date",
            ColumnType::Json => "json",
            ColumnType::Uuid => "uuid",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub default: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        ColumnDefinition {
            name: name.into(),
            column_type,
            nullable: true,
            unique: false,
            indexed: false,
            primary_key: false,
            default: None,
        }
    }
}

impl From<&ColumnConfig> for ColumnDefinition {
    fn from(c: &ColumnConfig) -> Self {
        ColumnDefinition {
            name: c.name.clone(),
            column_type: c.type_,
            nullable: c.nullable && !c.primary_key,
            unique: c.unique,
            indexed: c.indexed,
            primary_key: c.primary_key,
            default: c.default.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::OneToMany => "one_to_many",
            RelationKind::ManyToOne => "many_to_one",
            RelationKind::ManyToMany => "many_to_many",
        }
    }
}

/// Association from `subject` (the owning table) to `object`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub kind: RelationKind,
    pub subject: String,
    pub object: String,
    /// Set for many-to-many once the join table has been derived.
    #[serde(default)]
    pub join_table: Option<String>,
}

impl RelationDefinition {
    pub fn new(kind: RelationKind, subject: impl Into<String>, object: impl Into<String>) -> Self {
        RelationDefinition {
            kind,
            subject: subject.into(),
            object: object.into(),
            join_table: None,
        }
    }

    /// Relations are the same relation when kind and both ends match; the join table is derived.
    pub fn same_identity(&self, other: &RelationDefinition) -> bool {
        self.kind == other.kind && self.subject == other.subject && self.object == other.object
    }

    pub fn join_table_name(&self) -> String {
        join_table_name(&self.subject, &self.object)
    }
}

/// Join table for a many-to-many pair, e.g. `user_user_id_has_usergroup_usergroup_id`.
pub fn join_table_name(subject: &str, object: &str) -> String {
    format!(
        "{}_{}_has_{}_{}",
        subject,
        foreign_key_column(subject),
        object,
        foreign_key_column(object)
    )
}

/// Column holding a reference to `table`'s primary key.
pub fn foreign_key_column(table: &str) -> String {
    format!("{}_id", table)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        TableDefinition {
            name: name.into(),
            columns: Vec::new(),
            relations: Vec::new(),
            unique: Vec::new(),
        }
    }

    pub fn with_columns(mut self, columns: Vec<ColumnDefinition>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_relation(mut self, kind: RelationKind, object: &str) -> Self {
        let rel = RelationDefinition::new(kind, self.name.clone(), object);
        self.relations.push(rel);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Declared primary key: the flagged column, else a column named `id`.
    /// `None` means the table gets an implicit `id BIGSERIAL` key.
    pub fn primary_key(&self) -> Option<&ColumnDefinition> {
        self.columns
            .iter()
            .find(|c| c.primary_key)
            .or_else(|| self.column("id"))
    }

    /// Type used by columns referencing this table.
    pub fn key_type(&self) -> ColumnType {
        self.primary_key()
            .map(|c| c.column_type)
            .unwrap_or(ColumnType::Bigint)
    }
}

impl From<&TableConfig> for TableDefinition {
    fn from(t: &TableConfig) -> Self {
        TableDefinition {
            name: t.name.clone(),
            columns: t.columns.iter().map(ColumnDefinition::from).collect(),
            relations: t
                .relations
                .iter()
                .map(|r| RelationDefinition::new(r.kind, t.name.clone(), r.target.clone()))
                .collect(),
            unique: t.unique.clone(),
        }
    }
}

/// Reconciled table set the registry is built from. Table order is significant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedSchema {
    pub tables: Vec<TableDefinition>,
}

impl UnifiedSchema {
    pub fn new(tables: Vec<TableDefinition>) -> Self {
        UnifiedSchema { tables }
    }

    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }
}
