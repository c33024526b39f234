//! Raw declarative input: tables, state machines, actions, sites.

use crate::schema::{ColumnType, RelationKind};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ColumnType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub primary_key: bool,
    /// SQL default expression, e.g. `'draft'` or `NOW()`.
    #[serde(default)]
    pub default: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationConfig {
    pub kind: RelationKind,
    pub target: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
    /// Multi-column unique sets.
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventConfig {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub src: Vec<String>,
    pub dst: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateMachineConfig {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub entity_type: String,
    pub initial_state: String,
    pub states: Vec<String>,
    pub events: Vec<EventConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionFieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ColumnType,
    #[serde(default)]
    pub required: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionConfig {
    pub entity_type: String,
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub input_fields: Vec<ActionFieldConfig>,
    /// Name of a registered performer.
    pub performer: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    pub hostname: String,
}

/// Rows seeded into one table after boot.
#[derive(Clone, Debug)]
pub struct ImportConfig {
    pub table: String,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// All declarative input in one struct.
#[derive(Clone, Debug, Default)]
pub struct InitConfig {
    pub tables: Vec<TableConfig>,
    pub state_machines: Vec<StateMachineConfig>,
    pub actions: Vec<ActionConfig>,
    pub sites: Vec<SiteConfig>,
    pub imports: Vec<ImportConfig>,
}
