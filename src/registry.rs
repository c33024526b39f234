//! One generic CRUD resource per unified table, built once at boot and read-only afterwards.

use crate::error::AppError;
use crate::schema::{
    foreign_key_column, join_columns, ColumnType, RelationDefinition, RelationKind, TableDefinition, UnifiedSchema,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Direction of a related include: to_one (we hold the key) or to_many (they hold our key).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncludeDirection {
    ToOne,
    ToMany,
}

/// A related resource that can be embedded with `?include=name`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncludeSpec {
    pub name: String,
    pub direction: IncludeDirection,
    pub related: String,
    /// Our column used in the join (our FK for to_one; our PK for to_many).
    pub our_key_column: String,
    /// Their column used in the join (their PK for to_one; their FK for to_many).
    pub their_key_column: String,
}

/// Primary key type for parsing path ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkType {
    Uuid,
    BigInt,
    Int,
    Text,
}

impl PkType {
    fn of(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Uuid => PkType::Uuid,
            ColumnType::Bigint => PkType::BigInt,
            ColumnType::Integer => PkType::Int,
            _ => PkType::Text,
        }
    }

    pub fn parse(&self, raw: &str) -> Result<Value, AppError> {
        Ok(match self {
            PkType::Uuid => {
                let u = uuid::Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("invalid uuid".into()))?;
                Value::String(u.to_string())
            }
            PkType::BigInt | PkType::Int => {
                let n: i64 = raw.parse().map_err(|_| AppError::BadRequest("invalid id".into()))?;
                Value::Number(n.into())
            }
            PkType::Text => Value::String(raw.to_string()),
        })
    }
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub nullable: bool,
    /// The store fills the value when the body omits it (serial key, DEFAULT, timestamps).
    pub has_default: bool,
}

impl ColumnInfo {
    pub fn pg_type(&self) -> &'static str {
        self.column_type.pg_type()
    }

    /// Client must send a value on create.
    pub fn required(&self) -> bool {
        !self.nullable && !self.has_default
    }
}

#[derive(Clone, Debug)]
pub struct Resource {
    pub name: String,
    pub schema_name: String,
    pub pk_column: String,
    pub pk_type: PkType,
    pub columns: Vec<ColumnInfo>,
    pub relations: Vec<RelationDefinition>,
    pub includes: Vec<IncludeSpec>,
}

impl Resource {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn include(&self, name: &str) -> Option<&IncludeSpec> {
        self.includes.iter().find(|i| i.name == name)
    }

    fn from_table(table: &TableDefinition, schema: &UnifiedSchema, data_schema: &str) -> Self {
        let mut columns = Vec::with_capacity(table.columns.len() + 3);
        let (pk_column, pk_type) = match table.primary_key() {
            Some(pk) => {
                let serial = matches!(pk.column_type, ColumnType::Bigint | ColumnType::Integer | ColumnType::Uuid);
                columns.push(ColumnInfo {
                    name: pk.name.clone(),
                    column_type: pk.column_type,
                    primary_key: true,
                    nullable: false,
                    has_default: pk.default.is_some() || serial,
                });
                (pk.name.clone(), PkType::of(pk.column_type))
            }
            None => {
                columns.push(ColumnInfo {
                    name: "id".into(),
                    column_type: ColumnType::Bigint,
                    primary_key: true,
                    nullable: false,
                    has_default: true,
                });
                ("id".to_string(), PkType::BigInt)
            }
        };
        for c in table.columns.iter().filter(|c| c.name != pk_column) {
            columns.push(ColumnInfo {
                name: c.name.clone(),
                column_type: c.column_type,
                primary_key: false,
                nullable: c.nullable,
                has_default: c.default.is_some(),
            });
        }
        for ts in ["created_at", "updated_at"] {
            if !table.has_column(ts) {
                columns.push(ColumnInfo {
                    name: ts.into(),
                    column_type: ColumnType::Datetime,
                    primary_key: false,
                    nullable: false,
                    has_default: true,
                });
            }
        }

        Resource {
            name: table.name.clone(),
            schema_name: data_schema.to_string(),
            includes: includes_for(table, &pk_column, schema),
            pk_column,
            pk_type,
            columns,
            relations: table.relations.clone(),
        }
    }
}

fn key_of(schema: &UnifiedSchema, table: &str) -> String {
    schema
        .table(table)
        .and_then(|t| t.primary_key())
        .map(|c| c.name.clone())
        .unwrap_or_else(|| "id".to_string())
}

/// Includes from relations in both directions; the first include of a given name wins.
fn includes_for(table: &TableDefinition, pk: &str, schema: &UnifiedSchema) -> Vec<IncludeSpec> {
    let mut out: Vec<IncludeSpec> = Vec::new();
    let mut push = |spec: IncludeSpec| {
        if !out.iter().any(|i| i.name == spec.name) {
            out.push(spec);
        }
    };
    let all_relations = schema.tables.iter().flat_map(|t| t.relations.iter());
    for rel in all_relations {
        let ours = rel.subject == table.name;
        let theirs = rel.object == table.name;
        match rel.kind {
            RelationKind::ManyToOne => {
                if ours {
                    push(IncludeSpec {
                        name: rel.object.clone(),
                        direction: IncludeDirection::ToOne,
                        related: rel.object.clone(),
                        our_key_column: foreign_key_column(&rel.object),
                        their_key_column: key_of(schema, &rel.object),
                    });
                }
                if theirs {
                    push(IncludeSpec {
                        name: rel.subject.clone(),
                        direction: IncludeDirection::ToMany,
                        related: rel.subject.clone(),
                        our_key_column: pk.to_string(),
                        their_key_column: foreign_key_column(&table.name),
                    });
                }
            }
            RelationKind::OneToMany => {
                if ours {
                    push(IncludeSpec {
                        name: rel.object.clone(),
                        direction: IncludeDirection::ToMany,
                        related: rel.object.clone(),
                        our_key_column: pk.to_string(),
                        their_key_column: foreign_key_column(&table.name),
                    });
                }
                if theirs {
                    push(IncludeSpec {
                        name: rel.subject.clone(),
                        direction: IncludeDirection::ToOne,
                        related: rel.subject.clone(),
                        our_key_column: foreign_key_column(&rel.subject),
                        their_key_column: key_of(schema, &rel.subject),
                    });
                }
            }
            RelationKind::ManyToMany => {
                let Some(join) = rel.join_table.clone() else { continue };
                let (subject_col, object_col) = join_columns(rel);
                if ours {
                    push(IncludeSpec {
                        name: join.clone(),
                        direction: IncludeDirection::ToMany,
                        related: join.clone(),
                        our_key_column: pk.to_string(),
                        their_key_column: subject_col,
                    });
                } else if theirs {
                    push(IncludeSpec {
                        name: join.clone(),
                        direction: IncludeDirection::ToMany,
                        related: join,
                        our_key_column: pk.to_string(),
                        their_key_column: object_col,
                    });
                }
            }
        }
    }
    out
}

/// Resources by name. Shared behind `Arc` by every request handler and site.
#[derive(Clone, Debug, Default)]
pub struct ResourceRegistry {
    resources: HashMap<String, Arc<Resource>>,
    order: Vec<String>,
}

impl ResourceRegistry {
    pub fn build(schema: &UnifiedSchema, data_schema: &str) -> Self {
        let mut resources = HashMap::with_capacity(schema.tables.len());
        let mut order = Vec::with_capacity(schema.tables.len());
        for table in &schema.tables {
            let resource = Resource::from_table(table, schema, data_schema);
            order.push(resource.name.clone());
            resources.insert(resource.name.clone(), Arc::new(resource));
        }
        tracing::info!(resources = order.len(), "resource registry built");
        ResourceRegistry { resources, order }
    }

    pub fn get(&self, name: &str) -> Result<&Resource, AppError> {
        self.resources
            .get(name)
            .map(|r| r.as_ref())
            .ok_or_else(|| AppError::NotFound(format!("resource {}", name)))
    }

    /// Resources in unified-schema order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.order.iter().filter_map(|n| self.resources.get(n)).map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
