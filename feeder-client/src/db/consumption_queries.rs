use anyhow::Result;
use sqlx::{postgres::PgRow, PgPool, Row};
use time::{Date, OffsetDateTime};

use crate::domain::{CategoryBreakdown, ConsumptionRecord, HOURS_PER_DAY};

/// A stored consumption row together with its storage-managed columns.
#[derive(Debug, Clone)]
pub struct StoredConsumption {
    pub record: ConsumptionRecord,
    pub total_consumption: f64,
    pub updated_at: OffsetDateTime,
}

fn row_to_stored(row: &PgRow) -> Result<StoredConsumption> {
    let mut hourly = [0.0; HOURS_PER_DAY];
    for (i, slot) in hourly.iter_mut().enumerate() {
        *slot = row.try_get(format!("h{}", i + 1).as_str())?;
    }

    let record = ConsumptionRecord {
        tenant_id: row.try_get("distribution_id")?,
        feeder_id: row.try_get("feeder_id")?,
        date: row.try_get("date")?,
        is_holiday: row.try_get("is_off")?,
        hourly,
        categories: CategoryBreakdown {
            domestic: row.try_get("domestic")?,
            industrial: row.try_get("industrial")?,
            agriculture: row.try_get("agriculture")?,
            commercial: row.try_get("commercial")?,
            lighting: row.try_get("lighting")?,
            administrative: row.try_get("administrative")?,
        },
    };

    Ok(StoredConsumption {
        record,
        total_consumption: row.try_get("total_consumption")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Fetch the stored day for one feeder, if any.
pub async fn consumption_for_day(
    pool: &PgPool,
    feeder_id: i64,
    date: Date,
) -> Result<Option<StoredConsumption>> {
    let row = sqlx::query("SELECT * FROM power_consumption_data WHERE feeder_id = $1 AND date = $2")
        .bind(feeder_id)
        .bind(date)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_stored).transpose()
}
