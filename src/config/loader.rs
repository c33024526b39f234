//! Load declarative config from a directory of JSON files.

use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use std::path::Path;

const DEFAULT_EMPTY_JSON: &str = "[]";
const DATA_DIR: &str = "data";

/// Read `tables.json`, `state_machines.json`, `actions.json`, `sites.json` and `data/<table>.json`
/// under `dir`. Missing files count as empty. The result is validated before it is returned.
pub async fn load_from_dir(dir: &Path) -> Result<InitConfig, ConfigError> {
    let tables: Vec<TableConfig> = read_kind(dir, "tables").await?;
    let state_machines: Vec<StateMachineConfig> = read_kind(dir, "state_machines").await?;
    let actions: Vec<ActionConfig> = read_kind(dir, "actions").await?;
    let sites: Vec<SiteConfig> = read_kind(dir, "sites").await?;
    let imports = read_imports(&dir.join(DATA_DIR)).await?;

    let config = InitConfig {
        tables,
        state_machines,
        actions,
        sites,
        imports,
    };
    validate(&config)?;
    tracing::info!(
        dir = %dir.display(),
        tables = config.tables.len(),
        state_machines = config.state_machines.len(),
        actions = config.actions.len(),
        sites = config.sites.len(),
        imports = config.imports.len(),
        "loaded config"
    );
    Ok(config)
}

async fn read_kind<T: DeserializeOwned>(dir: &Path, kind: &str) -> Result<Vec<T>, ConfigError> {
    let file_name = format!("{}.json", kind);
    let path = dir.join(&file_name);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => DEFAULT_EMPTY_JSON.to_string(),
        Err(e) => return Err(ConfigError::Load(format!("{}: {}", path.display(), e))),
    };
    serde_json::from_str(&content).map_err(|e| ConfigError::Load(format!("invalid {}: {}", file_name, e)))
}

async fn read_imports(dir: &Path) -> Result<Vec<ImportConfig>, ConfigError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ConfigError::Load(format!("{}: {}", dir.display(), e))),
    };
    let mut imports = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ConfigError::Load(e.to_string()))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(table) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
            continue;
        };
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let rows: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(&content)
            .map_err(|e| ConfigError::Load(format!("invalid {}: {}", path.display(), e)))?;
        imports.push(ImportConfig { table, rows });
    }
    imports.sort_by(|a, b| a.table.cmp(&b.table));
    Ok(imports)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("goms-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join(DATA_DIR)).unwrap();
        dir
    }

    #[tokio::test]
    async fn missing_files_load_as_empty() {
        let dir = scratch_dir();
        let config = load_from_dir(&dir).await.unwrap();
        assert!(config.tables.is_empty());
        assert!(config.state_machines.is_empty());
        assert!(config.imports.is_empty());
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn reads_tables_and_import_rows() {
        let dir = scratch_dir();
        std::fs::write(
            dir.join("tables.json"),
            r#"[{"name":"order","columns":[{"name":"amount","type":"measurement","nullable":false}],
                "relations":[{"kind":"many_to_one","target":"customer"}]},
               {"name":"customer","columns":[{"name":"email","type":"email","unique":true}]}]"#,
        )
        .unwrap();
        std::fs::write(dir.join(DATA_DIR).join("customer.json"), r#"[{"email":"a@b.io"}]"#).unwrap();

        let config = load_from_dir(&dir).await.unwrap();
        assert_eq!(config.tables.len(), 2);
        assert_eq!(config.tables[0].relations[0].target, "customer");
        assert!(!config.tables[0].columns[0].nullable);
        assert_eq!(config.imports.len(), 1);
        assert_eq!(config.imports[0].table, "customer");
        assert_eq!(config.imports[0].rows.len(), 1);
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn malformed_file_is_a_load_error() {
        let dir = scratch_dir();
        std::fs::write(dir.join("actions.json"), "{not json").unwrap();
        let err = load_from_dir(&dir).await.unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
        std::fs::remove_dir_all(dir).ok();
    }
}
