use anyhow::{bail, Result};
use feeder_service::{
    config::AppConfig,
    observability,
    pipeline::ConsumptionImporter,
    sinks::PgConsumptionStore,
    sources::SchemaVariant,
    transform::RowNormalizer,
};
use sqlx::postgres::PgPoolOptions;
use std::{env, fs, sync::Arc, time::Duration};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: import_csv <simple|legacy> <csv_file_path>");
    }
    let variant = match args[1].as_str() {
        "simple" => SchemaVariant::Simple,
        "legacy" => SchemaVariant::Legacy,
        other => bail!("unknown layout '{other}', expected simple or legacy"),
    };
    let file_path = &args[2];
    let input = fs::read(file_path).map_err(|e| anyhow::anyhow!("failed to read {file_path}: {e}"))?;

    // Load configuration (FEEDER_CONFIG may point to an import-specific file).
    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let import_cfg = &cfg.import;
    let store = PgConsumptionStore::new(
        pool,
        import_cfg.max_rows_per_statement,
        import_cfg.max_retries,
        Duration::from_millis(import_cfg.retry_backoff_ms),
    );
    let importer = ConsumptionImporter::new(RowNormalizer::new(import_cfg.normalize_options()), Arc::new(store));

    let summary = importer.import(variant, input).await?;
    println!("{}", serde_json::to_string(&summary)?);

    Ok(())
}
