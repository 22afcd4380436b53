use feeder_client::db::feeder_queries;
use feeder_client::domain::FeederArea;
use sqlx::PgPool;

use super::{FeederRepository, RepositoryError};

pub struct PgFeederRepository {
    pool: PgPool,
}

impl PgFeederRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl FeederRepository for PgFeederRepository {
    async fn feeder_names_in_area(&self, area: i64) -> Result<Vec<String>, RepositoryError> {
        Ok(feeder_queries::feeder_names_in_area(&self.pool, area).await?)
    }

    async fn feeders_in_areas(&self, areas: &[i64]) -> Result<Vec<FeederArea>, RepositoryError> {
        Ok(feeder_queries::feeders_in_areas(&self.pool, areas).await?)
    }

    async fn areas_of_feeder(&self, feeder_name: &str) -> Result<Vec<i64>, RepositoryError> {
        Ok(feeder_queries::areas_of_feeder(&self.pool, feeder_name).await?)
    }

    async fn all_feeder_names(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(feeder_queries::all_feeder_names(&self.pool).await?)
    }

    async fn all_areas(&self) -> Result<Vec<i64>, RepositoryError> {
        Ok(feeder_queries::all_areas(&self.pool).await?)
    }
}
