//! Feeder and region lookups over the feeder registry.
//!
//! Regions have no table of their own; they are the distinct `area`
//! values of registered feeders. Every call re-queries the repository.

pub mod postgres;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use feeder_client::domain::FeederArea;
use futures::future::join_all;
use serde::Serialize;

pub use postgres::PgFeederRepository;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("feeder repository error: {0}")]
pub struct RepositoryError(pub String);

impl From<anyhow::Error> for RepositoryError {
    fn from(e: anyhow::Error) -> Self {
        Self(e.to_string())
    }
}

/// A single region that could not be resolved inside a multi-region call.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to resolve region {region}: {source}")]
pub struct RegionResolutionError {
    pub region: i64,
    #[source]
    pub source: RepositoryError,
}

#[async_trait::async_trait]
pub trait FeederRepository: Send + Sync {
    async fn feeder_names_in_area(&self, area: i64) -> Result<Vec<String>, RepositoryError>;
    async fn feeders_in_areas(&self, areas: &[i64]) -> Result<Vec<FeederArea>, RepositoryError>;
    async fn areas_of_feeder(&self, feeder_name: &str) -> Result<Vec<i64>, RepositoryError>;
    async fn all_feeder_names(&self) -> Result<Vec<String>, RepositoryError>;
    async fn all_areas(&self) -> Result<Vec<i64>, RepositoryError>;
}

/// Ordering key for feeder names of the form `<prefix>-<number>`.
///
/// The integer after the last `-` orders numerically; names without a
/// numeric suffix sort after all numbered ones, by name.
pub fn feeder_sort_key(name: &str) -> (bool, i64, &str) {
    match name.rsplit('-').next().and_then(|s| s.trim().parse::<i64>().ok()) {
        Some(n) => (false, n, name),
        None => (true, 0, name),
    }
}

pub fn sort_feeders(names: &mut [String]) {
    names.sort_by(|a, b| feeder_sort_key(a).cmp(&feeder_sort_key(b)));
}

/// Result of resolving several regions at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegionFeeders {
    /// Every feeder found, once, in first-seen order across the requested regions.
    pub all_feeders: Vec<String>,
    pub region_map: BTreeMap<i64, Vec<String>>,
    /// Requested regions that produced at least one feeder, in request order.
    pub resolved_regions: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Catalog {
    pub feeders: Vec<String>,
    pub regions: Vec<i64>,
}

#[derive(Clone)]
pub struct FeederResolver {
    repo: Arc<dyn FeederRepository>,
}

impl FeederResolver {
    pub fn new(repo: Arc<dyn FeederRepository>) -> Self {
        Self { repo }
    }

    pub async fn feeders_for_region(&self, region: i64) -> Result<Vec<String>, RepositoryError> {
        let mut names = self.repo.feeder_names_in_area(region).await?;
        sort_feeders(&mut names);
        names.dedup();
        Ok(names)
    }

    /// Resolve several regions in one repository round-trip.
    ///
    /// If the bulk lookup fails each region is retried on its own; regions
    /// that still fail are logged and left out of the result.
    pub async fn feeders_for_regions(&self, regions: &[i64]) -> RegionFeeders {
        let mut seen = HashSet::new();
        let requested: Vec<i64> = regions.iter().copied().filter(|r| seen.insert(*r)).collect();
        if requested.is_empty() {
            return RegionFeeders::default();
        }

        let per_region: Vec<(i64, Vec<String>)> = match self.repo.feeders_in_areas(&requested).await {
            Ok(rows) => {
                let mut grouped: BTreeMap<i64, Vec<String>> = BTreeMap::new();
                for FeederArea { feeder_name, area } in rows {
                    grouped.entry(area).or_default().push(feeder_name);
                }
                requested
                    .iter()
                    .map(|r| (*r, grouped.remove(r).unwrap_or_default()))
                    .collect()
            }
            Err(e) => {
                tracing::warn!(error = %e, "bulk region lookup failed, resolving regions one by one");
                let lookups = requested.iter().map(|&r| async move { (r, self.repo.feeder_names_in_area(r).await) });
                join_all(lookups)
                    .await
                    .into_iter()
                    .filter_map(|(region, res)| match res {
                        Ok(names) => Some((region, names)),
                        Err(source) => {
                            let err = RegionResolutionError { region, source };
                            tracing::error!(error = %err, "region excluded from result");
                            metrics::counter!("region_resolution_failures_total").increment(1);
                            None
                        }
                    })
                    .collect()
            }
        };

        let mut out = RegionFeeders::default();
        let mut in_all = HashSet::new();
        for (region, mut names) in per_region {
            sort_feeders(&mut names);
            names.dedup();
            if names.is_empty() {
                continue;
            }
            for name in &names {
                if in_all.insert(name.clone()) {
                    out.all_feeders.push(name.clone());
                }
            }
            out.region_map.insert(region, names);
            out.resolved_regions.push(region);
        }
        out
    }

    pub async fn regions_for_feeder(&self, feeder_name: &str) -> Result<Vec<i64>, RepositoryError> {
        let mut areas = self.repo.areas_of_feeder(feeder_name).await?;
        areas.sort_unstable();
        areas.dedup();
        Ok(areas)
    }

    pub async fn all_feeders_and_regions(&self) -> Result<Catalog, RepositoryError> {
        let (mut feeders, mut regions) =
            futures::try_join!(self.repo.all_feeder_names(), self.repo.all_areas())?;

        sort_feeders(&mut feeders);
        feeders.dedup();
        regions.sort_unstable();
        regions.dedup();

        Ok(Catalog { feeders, regions })
    }
}
