use anyhow::Result;
use feeder_service::{
    analysis::{Aggregator, HttpAnalysisClient},
    config::AppConfig,
    http::{self, AppState},
    metrics_server, observability,
    pipeline::{ConsumptionImporter, FeederImporter},
    resolver::{FeederResolver, PgFeederRepository},
    sinks::{PgConsumptionStore, PgFeederStore},
    transform::RowNormalizer,
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let import_cfg = &cfg.import;
    let store = PgConsumptionStore::new(
        pool.clone(),
        import_cfg.max_rows_per_statement,
        import_cfg.max_retries,
        Duration::from_millis(import_cfg.retry_backoff_ms),
    );
    let importer = ConsumptionImporter::new(RowNormalizer::new(import_cfg.normalize_options()), Arc::new(store));
    let feeders = FeederImporter::new(import_cfg.legacy_tenant_id, Arc::new(PgFeederStore::new(pool.clone())));
    let resolver = FeederResolver::new(Arc::new(PgFeederRepository::new(pool)));

    let analysis_cfg = &cfg.analysis;
    let client = HttpAnalysisClient::new(
        &analysis_cfg.base_url,
        Duration::from_secs(analysis_cfg.timeout_secs),
        Duration::from_secs(analysis_cfg.health_timeout_secs),
    )?;
    let aggregator = Aggregator::new(Arc::new(client), analysis_cfg.max_concurrency);

    let state = AppState {
        scope: Arc::new(cfg.tenancy.scope_resolver()),
        resolver,
        importer: Arc::new(importer),
        feeders: Arc::new(feeders),
        aggregator: Arc::new(aggregator),
        analysis_base_url: analysis_cfg.base_url.clone(),
    };
    let app = http::router(state, cfg.http.max_upload_bytes);

    let addr: SocketAddr = cfg
        .http
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid http.bind_addr: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "feeder service listening");

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
