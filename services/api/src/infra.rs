use crate::cli::ImportArgs;
use assessment_workflow::config::{AppConfig, CatalogConfig};
use assessment_workflow::error::AppError;
use assessment_workflow::workflows::assessment::AssessmentStore;
use assessment_workflow::workflows::assessment::{MemoryStore, SqliteStore};
use assessment_workflow::workflows::catalog_import::{CatalogImporter, ImportSummary};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Imports the configured seed catalog, if any, before the store is put behind the router.
pub(crate) fn seed_catalog<S: AssessmentStore>(
    store: &S,
    catalog: &CatalogConfig,
) -> Result<Option<ImportSummary>, AppError> {
    let Some(path) = catalog.seed_csv.as_ref() else {
        return Ok(None);
    };

    let summary = CatalogImporter::from_path(store, path)?;
    info!(path = %path.display(), rows = summary.rows, "seed catalog applied");
    Ok(Some(summary))
}

pub(crate) fn run_catalog_import(args: ImportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let database = args.database.or(config.storage.database_path);

    let summary = match &database {
        Some(path) => {
            let store = SqliteStore::open(path)?.with_busy_timeout(config.storage.busy_timeout)?;
            CatalogImporter::from_path(&store, &args.path)?
        }
        None => CatalogImporter::from_path(&MemoryStore::new(), &args.path)?,
    };

    match &database {
        Some(path) => println!("Imported {} into {}", args.path.display(), path.display()),
        None => println!(
            "Validated {} (no database configured, nothing persisted)",
            args.path.display()
        ),
    }
    print_import_summary(&summary);
    Ok(())
}

pub(crate) fn print_import_summary(summary: &ImportSummary) {
    println!("- {} rows read", summary.rows);
    println!(
        "- pillars: {} created, {} refreshed",
        summary.pillars_created, summary.pillars_updated
    );
    println!("- questions created: {}", summary.questions_created);
    println!("- choices created: {}", summary.choices_created);
    println!("- points created: {}", summary.points_created);
}
