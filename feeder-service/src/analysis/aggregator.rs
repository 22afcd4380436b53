//! Concurrent dispatch of analysis sub-queries and merging of their
//! outcomes.
//!
//! A sub-query failure never fails its siblings: it is recorded in its own
//! slot and the rest of the result is filled normally.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;

use super::payload::{ComparisonPayload, LimitationPayload, LongTermPayload, ProfileMethod, ProfilePayload, RangePayload};
use super::query::{AnalysisQuery, ComparisonQuery, LimitationQuery};
use super::{AnalysisBackend, AnalysisError, Endpoint, HealthStatus, Payload, Unavailable};
use crate::tenant::TenantContext;

/// Outcome of one sub-query as it appears in a merged result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SubOutcome {
    Ok(Value),
    Failed { error: String, status: u16 },
}

impl From<Result<Value, AnalysisError>> for SubOutcome {
    fn from(res: Result<Value, AnalysisError>) -> Self {
        match res {
            Ok(v) => Self::Ok(v),
            Err(e) => Self::Failed {
                error: e.message(),
                status: e.status_code(),
            },
        }
    }
}

impl SubOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

pub type SubResults = BTreeMap<&'static str, SubOutcome>;

/// Merged result of a full analysis: one entry per sub-query key, or for
/// an administrative request one such map per company display name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregatedResult {
    Tenant(SubResults),
    Companies(BTreeMap<String, SubResults>),
}

/// Result of a single-endpoint query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SingleResult {
    Direct(Value),
    Companies(BTreeMap<String, SubOutcome>),
}

struct SubQuery {
    key: &'static str,
    endpoint: Endpoint,
    payload: Payload,
}

fn analysis_sub_queries(company_id: i64, query: &AnalysisQuery) -> Vec<SubQuery> {
    let range = RangePayload::new(company_id, query);
    let profile = |method| {
        Payload::Profile(ProfilePayload {
            range: range.clone(),
            method,
        })
    };

    vec![
        SubQuery {
            key: "daily_peak",
            endpoint: Endpoint::DailyPeak,
            payload: Payload::Range(range.clone()),
        },
        SubQuery {
            key: "weekly_peak",
            endpoint: Endpoint::WeeklyPeak,
            payload: Payload::Range(range.clone()),
        },
        SubQuery {
            key: "Load_continuity",
            endpoint: Endpoint::LoadContinuity,
            payload: Payload::Range(range.clone()),
        },
        SubQuery {
            key: "long_term",
            endpoint: Endpoint::LongTerm,
            payload: Payload::LongTerm(LongTermPayload::new(company_id, query)),
        },
        SubQuery {
            key: "daily_profil_max",
            endpoint: Endpoint::DailyProfile,
            payload: profile(ProfileMethod::Max),
        },
        SubQuery {
            key: "daily_profil_mean",
            endpoint: Endpoint::DailyProfile,
            payload: profile(ProfileMethod::Mean),
        },
    ]
}

pub struct Aggregator {
    backend: Arc<dyn AnalysisBackend>,
    max_concurrency: usize,
}

impl Aggregator {
    /// `max_concurrency` bounds the outbound calls in flight for one
    /// logical query.
    pub fn new(backend: Arc<dyn AnalysisBackend>, max_concurrency: usize) -> Self {
        Self {
            backend,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub async fn health(&self) -> HealthStatus {
        self.backend.health().await
    }

    async fn dispatch(&self, calls: &[SubQuery]) -> Vec<Result<Value, AnalysisError>> {
        let limit = Semaphore::new(self.max_concurrency);
        let limit = &limit;

        join_all(calls.iter().map(|c| async move {
            let _permit = limit
                .acquire()
                .await
                .map_err(|_| AnalysisError::Unavailable(Unavailable::Unexpected(None)))?;
            self.backend.call(c.endpoint, &c.payload).await
        }))
        .await
    }

    /// The six-part feeder analysis. Standard tenants get one result map;
    /// the administrative identity gets one per target company.
    pub async fn run_analysis(&self, scope: &TenantContext, query: &AnalysisQuery) -> AggregatedResult {
        if !scope.is_admin() {
            let calls = analysis_sub_queries(scope.tenant_id, query);
            let results = self.dispatch(&calls).await;
            return AggregatedResult::Tenant(collect(&calls, results));
        }

        let mut owners = Vec::new();
        let mut calls = Vec::new();
        for target in &scope.targets {
            for call in analysis_sub_queries(target.tenant_id, query) {
                owners.push(target.name.as_str());
                calls.push(call);
            }
        }
        let results = self.dispatch(&calls).await;

        let mut merged: BTreeMap<String, SubResults> = scope
            .targets
            .iter()
            .map(|t| (t.name.clone(), SubResults::new()))
            .collect();
        for ((owner, call), res) in owners.into_iter().zip(&calls).zip(results) {
            let slot = merged.entry(owner.to_string()).or_default();
            slot.insert(call.key, outcome(Some(owner), call, res));
        }
        AggregatedResult::Companies(merged)
    }

    pub async fn run_comparison(
        &self,
        scope: &TenantContext,
        query: &ComparisonQuery,
    ) -> Result<SingleResult, AnalysisError> {
        self.run_single(scope, Endpoint::CompareEnergetic, |id| {
            Payload::Comparison(ComparisonPayload::new(id, query))
        })
        .await
    }

    pub async fn run_distribution(
        &self,
        scope: &TenantContext,
        query: &AnalysisQuery,
    ) -> Result<SingleResult, AnalysisError> {
        self.run_single(scope, Endpoint::ConsumptionDistribution, |id| {
            Payload::Range(RangePayload::new(id, query))
        })
        .await
    }

    pub async fn run_limitation(
        &self,
        scope: &TenantContext,
        query: &LimitationQuery,
    ) -> Result<SingleResult, AnalysisError> {
        self.run_single(scope, Endpoint::ConsumptionLimitation, |id| {
            Payload::Limitation(LimitationPayload::new(id, query))
        })
        .await
    }

    /// One call for a standard tenant, whose failure is returned as is;
    /// one call per company for the administrative identity, merged by
    /// company name.
    async fn run_single<F>(
        &self,
        scope: &TenantContext,
        endpoint: Endpoint,
        build: F,
    ) -> Result<SingleResult, AnalysisError>
    where
        F: Fn(i64) -> Payload,
    {
        if !scope.is_admin() {
            let value = self.backend.call(endpoint, &build(scope.tenant_id)).await?;
            return Ok(SingleResult::Direct(value));
        }

        let calls: Vec<SubQuery> = scope
            .targets
            .iter()
            .map(|t| SubQuery {
                key: endpoint.path(),
                endpoint,
                payload: build(t.tenant_id),
            })
            .collect();
        let results = self.dispatch(&calls).await;

        let merged = scope
            .targets
            .iter()
            .zip(&calls)
            .zip(results)
            .map(|((t, call), res)| (t.name.clone(), outcome(Some(t.name.as_str()), call, res)))
            .collect();
        Ok(SingleResult::Companies(merged))
    }
}

fn outcome(company: Option<&str>, call: &SubQuery, res: Result<Value, AnalysisError>) -> SubOutcome {
    if let Err(e) = &res {
        tracing::error!(key = call.key, company, error = %e, "analysis sub-query failed");
    }
    SubOutcome::from(res)
}

fn collect(calls: &[SubQuery], results: Vec<Result<Value, AnalysisError>>) -> SubResults {
    calls
        .iter()
        .zip(results)
        .map(|(call, res)| (call.key, outcome(None, call, res)))
        .collect()
}
