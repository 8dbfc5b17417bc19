use crate::cli::ServeArgs;
use crate::infra::{seed_catalog, AppState};
use crate::routes::with_assessment_routes;
use assessment_workflow::config::AppConfig;
use assessment_workflow::error::AppError;
use assessment_workflow::telemetry;
use assessment_workflow::workflows::assessment::{
    AssessmentService, AssessmentStore, MemoryStore, NoEvidence, SqliteStore,
};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(database) = args.database.take() {
        config.storage.database_path = Some(database);
    }

    telemetry::init(&config.telemetry)?;

    match config.storage.database_path.clone() {
        Some(path) => {
            info!(path = %path.display(), "opening sqlite assessment store");
            let store = SqliteStore::open(&path)?.with_busy_timeout(config.storage.busy_timeout)?;
            serve(store, config).await
        }
        None => {
            info!("no database configured, assessment data lives in memory");
            serve(MemoryStore::new(), config).await
        }
    }
}

async fn serve<S>(store: S, config: AppConfig) -> Result<(), AppError>
where
    S: AssessmentStore + 'static,
{
    seed_catalog(&store, &config.catalog)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let service = Arc::new(AssessmentService::new(Arc::new(store), Arc::new(NoEvidence)));

    let app = with_assessment_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "assessment workflow service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
