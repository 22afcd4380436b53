use std::time::Duration;

use feeder_client::db::{consumption_queries, feeder_queries};
use feeder_client::domain::{ConsumptionRecord, NewFeeder, HOURS_PER_DAY};
use sqlx::{postgres::PgPool, Postgres, QueryBuilder};
use time::Date;

use crate::pipeline::{dedupe_last_wins, ConsumptionStore, FeederStore, ImportSummary, StorageError};

/// Bind parameters per consumption row: tenant, feeder, date, holiday,
/// 24 hours and 6 category columns.
const BINDS_PER_ROW: usize = 4 + HOURS_PER_DAY + 6;
/// Postgres caps a single statement at 65535 bind parameters.
const MAX_ROWS_PER_STATEMENT: usize = u16::MAX as usize / BINDS_PER_ROW;

const INSERT_PREFIX: &str = "INSERT INTO power_consumption_data (distribution_id, feeder_id, date, is_off, \
h1, h2, h3, h4, h5, h6, h7, h8, h9, h10, h11, h12, \
h13, h14, h15, h16, h17, h18, h19, h20, h21, h22, h23, h24, \
domestic, industrial, agriculture, commercial, lighting, administrative) ";

const ON_CONFLICT: &str = " ON CONFLICT (feeder_id, date) DO UPDATE SET \
distribution_id = EXCLUDED.distribution_id, is_off = EXCLUDED.is_off, \
h1 = EXCLUDED.h1, h2 = EXCLUDED.h2, h3 = EXCLUDED.h3, h4 = EXCLUDED.h4, \
h5 = EXCLUDED.h5, h6 = EXCLUDED.h6, h7 = EXCLUDED.h7, h8 = EXCLUDED.h8, \
h9 = EXCLUDED.h9, h10 = EXCLUDED.h10, h11 = EXCLUDED.h11, h12 = EXCLUDED.h12, \
h13 = EXCLUDED.h13, h14 = EXCLUDED.h14, h15 = EXCLUDED.h15, h16 = EXCLUDED.h16, \
h17 = EXCLUDED.h17, h18 = EXCLUDED.h18, h19 = EXCLUDED.h19, h20 = EXCLUDED.h20, \
h21 = EXCLUDED.h21, h22 = EXCLUDED.h22, h23 = EXCLUDED.h23, h24 = EXCLUDED.h24, \
domestic = EXCLUDED.domestic, industrial = EXCLUDED.industrial, \
agriculture = EXCLUDED.agriculture, commercial = EXCLUDED.commercial, \
lighting = EXCLUDED.lighting, administrative = EXCLUDED.administrative, \
updated_at = now()";

fn upsert_statement(chunk: &[ConsumptionRecord]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new(INSERT_PREFIX);
    builder.push_values(chunk, |mut b, r| {
        b.push_bind(r.tenant_id)
            .push_bind(r.feeder_id)
            .push_bind(r.date)
            .push_bind(r.is_holiday);
        for h in r.hourly {
            b.push_bind(h);
        }
        let c = &r.categories;
        b.push_bind(c.domestic)
            .push_bind(c.industrial)
            .push_bind(c.agriculture)
            .push_bind(c.commercial)
            .push_bind(c.lighting)
            .push_bind(c.administrative);
    });
    builder.push(ON_CONFLICT);
    builder
}

/// Idempotent batch writer for `power_consumption_data`.
///
/// All chunks of one batch run inside a single transaction, so a failed
/// chunk rolls back the whole import.
pub struct PgConsumptionStore {
    pool: PgPool,
    rows_per_statement: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl PgConsumptionStore {
    pub fn new(pool: PgPool, rows_per_statement: usize, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            pool,
            rows_per_statement: rows_per_statement.clamp(1, MAX_ROWS_PER_STATEMENT),
            max_retries,
            retry_backoff,
        }
    }

    async fn write_batch(&self, records: &[ConsumptionRecord]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for chunk in records.chunks(self.rows_per_statement) {
            let mut statement = upsert_statement(chunk);
            statement.build().execute(&mut *tx).await?;
        }
        tx.commit().await
    }
}

#[async_trait::async_trait]
impl ConsumptionStore for PgConsumptionStore {
    async fn upsert(&self, records: &[ConsumptionRecord]) -> Result<ImportSummary, StorageError> {
        if records.is_empty() {
            return Ok(ImportSummary::default());
        }
        let accepted = records.len() as u64;
        let records = dedupe_last_wins(records.to_vec());

        let started = std::time::Instant::now();
        let mut attempt: u32 = 0;
        loop {
            match self.write_batch(&records).await {
                Ok(()) => {
                    metrics::histogram!("consumption_upsert_duration_seconds")
                        .record(started.elapsed().as_secs_f64());
                    return Ok(ImportSummary {
                        added: accepted,
                        ..ImportSummary::default()
                    });
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(error = %e, attempt, "consumption upsert failed, retrying with backoff");
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, rows = records.len(), "consumption upsert failed, giving up");
                    return Err(e.into());
                }
            }
        }
    }

    async fn fetch_day(&self, feeder_id: i64, date: Date) -> Result<Option<ConsumptionRecord>, StorageError> {
        let stored = consumption_queries::consumption_for_day(&self.pool, feeder_id, date).await?;
        Ok(stored.map(|s| s.record))
    }
}

pub struct PgFeederStore {
    pool: PgPool,
}

impl PgFeederStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl FeederStore for PgFeederStore {
    async fn insert_feeders(&self, feeders: &[NewFeeder]) -> Result<u64, StorageError> {
        Ok(feeder_queries::insert_feeders(&self.pool, feeders).await?)
    }
}
