//! Background seeding of `data/<table>.json` rows. Runs concurrently with request serving, so
//! readers may observe a partial import.

use crate::config::ImportConfig;
use crate::registry::ResourceRegistry;
use crate::service::{RequestValidator, ResourceStore};
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub inserted: usize,
    pub failed: usize,
}

/// Insert every row of every import. A failing row is logged and counted; it never stops the import.
pub async fn run_import(
    imports: &[ImportConfig],
    registry: &ResourceRegistry,
    rows: &dyn ResourceStore,
) -> ImportReport {
    let mut report = ImportReport::default();
    for import in imports {
        let resource = match registry.get(&import.table) {
            Ok(r) => r,
            Err(_) => {
                tracing::warn!(table = %import.table, rows = import.rows.len(), "import skipped: unknown table");
                report.failed += import.rows.len();
                continue;
            }
        };
        let mut inserted = 0usize;
        for (i, row) in import.rows.iter().enumerate() {
            let outcome = match RequestValidator::validate_create(resource, row) {
                Ok(()) => rows.create(resource, row).await.map(|_| ()),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => inserted += 1,
                Err(e) => {
                    tracing::warn!(table = %import.table, row = i, error = %e, "import row failed");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(table = %import.table, inserted, "import finished");
        report.inserted += inserted;
    }
    report
}

/// Start the import on the runtime and return immediately.
pub fn spawn_import(
    imports: Vec<ImportConfig>,
    registry: Arc<ResourceRegistry>,
    rows: Arc<dyn ResourceStore>,
) -> JoinHandle<ImportReport> {
    tokio::spawn(async move {
        let report = run_import(&imports, &registry, rows.as_ref()).await;
        tracing::info!(inserted = report.inserted, failed = report.failed, "data import done");
        report
    })
}
