//! Request bodies of the analysis service. Field names are fixed by the
//! remote service and must not change independently of it.

use serde::Serialize;

use super::query::{AnalysisQuery, ComparisonQuery, LimitationQuery, Period};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangePayload {
    pub company_id: Vec<i64>,
    pub start_date: String,
    pub end_date: String,
    pub region_code: Vec<i64>,
    pub fidder_code: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileMethod {
    Max,
    Mean,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfilePayload {
    #[serde(flatten)]
    pub range: RangePayload,
    pub method: ProfileMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongTermPayload {
    pub company_id: Vec<i64>,
    pub year: Vec<i32>,
    pub region_code: Vec<i64>,
    pub fidder_code: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonPayload {
    #[serde(flatten)]
    pub range: RangePayload,
    pub period: &'static str,
    /// Only set for custom periods; sent as `null` otherwise.
    pub costume_period: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitationPayload {
    pub company_id: Vec<i64>,
    pub fidder_code: Vec<i64>,
    pub region_code: Vec<i64>,
    #[serde(rename = "No_limitation_start_date")]
    pub no_limitation_start_date: String,
    #[serde(rename = "No_limitation_end_date")]
    pub no_limitation_end_date: String,
    pub limitation_start_date: String,
    pub limitation_end_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Range(RangePayload),
    Profile(ProfilePayload),
    LongTerm(LongTermPayload),
    Comparison(ComparisonPayload),
    Limitation(LimitationPayload),
}

impl RangePayload {
    pub fn new(company_id: i64, query: &AnalysisQuery) -> Self {
        Self {
            company_id: vec![company_id],
            start_date: query.range.start_str(),
            end_date: query.range.end_str(),
            region_code: query.regions.clone(),
            fidder_code: query.feeders.clone(),
        }
    }
}

impl LongTermPayload {
    pub fn new(company_id: i64, query: &AnalysisQuery) -> Self {
        Self {
            company_id: vec![company_id],
            year: query.range.years.clone(),
            region_code: query.regions.clone(),
            fidder_code: query.feeders.clone(),
        }
    }
}

impl ComparisonPayload {
    pub fn new(company_id: i64, query: &ComparisonQuery) -> Self {
        let (period, costume_period) = match query.period {
            Period::Week => ("week", None),
            Period::Month => ("month", None),
            Period::Year => ("year", None),
            Period::Custom(days) => ("custom", Some(days)),
        };
        Self {
            range: RangePayload::new(company_id, &query.base),
            period,
            costume_period,
        }
    }
}

impl LimitationPayload {
    pub fn new(company_id: i64, query: &LimitationQuery) -> Self {
        Self {
            company_id: vec![company_id],
            fidder_code: query.feeders.clone(),
            region_code: query.regions.clone(),
            no_limitation_start_date: query.no_limitation.start_str(),
            no_limitation_end_date: query.no_limitation.end_str(),
            limitation_start_date: query.limitation.start_str(),
            limitation_end_date: query.limitation.end_str(),
        }
    }
}
