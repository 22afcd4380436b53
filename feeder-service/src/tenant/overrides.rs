use std::collections::BTreeMap;

use serde::Deserialize;

use crate::resolver::{Catalog, FeederResolver, RegionFeeders, RepositoryError};

/// Fixed region/feeder scope for a demo account. Region lookups by such an
/// account are answered from this table instead of the feeder registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScopeOverride {
    pub email: String,
    pub regions: Vec<i64>,
    pub feeders: Vec<String>,
}

impl ScopeOverride {
    fn region_feeders(&self) -> RegionFeeders {
        RegionFeeders {
            all_feeders: self.feeders.clone(),
            region_map: self
                .regions
                .iter()
                .map(|r| (*r, self.feeders.clone()))
                .collect::<BTreeMap<_, _>>(),
            resolved_regions: self.regions.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionQuery {
    All,
    Region(i64),
    Regions(Vec<i64>),
    Feeder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionAnswer {
    Catalog(Catalog),
    Region { region: i64, feeders: Vec<String> },
    Regions { requested: Vec<i64>, feeders: RegionFeeders },
    Feeder { feeder: String, regions: Vec<i64> },
}

/// Answer a region lookup, consulting the caller's override first.
/// Feeder-to-region lookups are never overridden.
pub async fn lookup_regions(
    scope: Option<&ScopeOverride>,
    resolver: &FeederResolver,
    query: RegionQuery,
) -> Result<RegionAnswer, RepositoryError> {
    match (query, scope) {
        (RegionQuery::Feeder(feeder), _) => {
            let regions = resolver.regions_for_feeder(&feeder).await?;
            Ok(RegionAnswer::Feeder { feeder, regions })
        }
        (RegionQuery::All, Some(o)) => Ok(RegionAnswer::Catalog(Catalog {
            feeders: o.feeders.clone(),
            regions: o.regions.clone(),
        })),
        (RegionQuery::All, None) => Ok(RegionAnswer::Catalog(resolver.all_feeders_and_regions().await?)),
        (RegionQuery::Region(region), Some(o)) => Ok(RegionAnswer::Region {
            region,
            feeders: o.feeders.clone(),
        }),
        (RegionQuery::Region(region), None) => Ok(RegionAnswer::Region {
            region,
            feeders: resolver.feeders_for_region(region).await?,
        }),
        (RegionQuery::Regions(requested), Some(o)) => Ok(RegionAnswer::Regions {
            requested,
            feeders: o.region_feeders(),
        }),
        (RegionQuery::Regions(requested), None) => {
            let feeders = resolver.feeders_for_regions(&requested).await;
            Ok(RegionAnswer::Regions { requested, feeders })
        }
    }
}
