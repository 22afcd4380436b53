use anyhow::Result;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::domain::{FeederArea, NewFeeder};

/// Distinct feeder names registered under one area, in storage order.
pub async fn feeder_names_in_area(pool: &PgPool, area: i64) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT feeder_name
        FROM feeders
        WHERE area = $1
        ORDER BY feeder_name
        "#,
    )
    .bind(area)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Feeder/area pairs for several areas in a single round-trip.
pub async fn feeders_in_areas(pool: &PgPool, areas: &[i64]) -> Result<Vec<FeederArea>> {
    let rows = sqlx::query_as::<_, FeederArea>(
        r#"
        SELECT DISTINCT feeder_name, area
        FROM feeders
        WHERE area = ANY($1)
        ORDER BY area, feeder_name
        "#,
    )
    .bind(areas)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn areas_of_feeder(pool: &PgPool, feeder_name: &str) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT DISTINCT area FROM feeders WHERE feeder_name = $1 ORDER BY area")
            .bind(feeder_name)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn all_feeder_names(pool: &PgPool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT DISTINCT feeder_name FROM feeders ORDER BY feeder_name")
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn all_areas(pool: &PgPool) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as("SELECT DISTINCT area FROM feeders ORDER BY area")
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Insert feeders in one transaction. Pairs already present for the same
/// `(feeder_name, area)` are left as they are. Returns the number of new rows.
pub async fn insert_feeders(pool: &PgPool, feeders: &[NewFeeder]) -> Result<u64> {
    if feeders.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    // Four binds per row keeps each chunk far below the Postgres bind limit.
    for chunk in feeders.chunks(5_000) {
        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO feeders (feeder_name, specification_name, area, distribution_id) ",
        );
        builder.push_values(chunk, |mut b, f| {
            b.push_bind(&f.feeder_name)
                .push_bind(Option::<String>::None)
                .push_bind(f.area)
                .push_bind(f.distribution_id);
        });
        builder.push(" ON CONFLICT (feeder_name, area) DO NOTHING");

        inserted += builder.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}
