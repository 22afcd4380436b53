use anyhow::{bail, Result};
use feeder_service::{config::AppConfig, observability, pipeline::FeederImporter, sinks::PgFeederStore};
use sqlx::postgres::PgPoolOptions;
use std::{env, fs, sync::Arc};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: import_feeders <csv_file_path>");
    }
    let file_path = &args[1];
    let input = fs::read(file_path).map_err(|e| anyhow::anyhow!("failed to read {file_path}: {e}"))?;

    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let importer = FeederImporter::new(cfg.import.legacy_tenant_id, Arc::new(PgFeederStore::new(pool)));
    let summary = importer.import(&input).await?;
    println!("{}", serde_json::to_string(&summary)?);

    Ok(())
}
