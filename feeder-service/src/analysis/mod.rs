//! Fan-out of analytical queries to the external analysis service.

pub mod aggregator;
pub mod client;
pub mod payload;
pub mod query;

use serde::Serialize;
use serde_json::Value;

pub use aggregator::{AggregatedResult, Aggregator, SingleResult, SubOutcome};
pub use client::HttpAnalysisClient;
pub use payload::Payload;
pub use query::{AnalysisParams, AnalysisQuery, ComparisonQuery, LimitationQuery, Period, QueryError};

/// Named endpoints of the analysis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    DailyPeak,
    WeeklyPeak,
    LoadContinuity,
    LongTerm,
    DailyProfile,
    CompareEnergetic,
    ConsumptionDistribution,
    ConsumptionLimitation,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Self::DailyPeak => "daily-peak",
            Self::WeeklyPeak => "weekly-peak",
            Self::LoadContinuity => "Load-continuity",
            Self::LongTerm => "long-term",
            Self::DailyProfile => "daily-profile",
            Self::CompareEnergetic => "compare-energetic",
            Self::ConsumptionDistribution => "consumption-distribution",
            Self::ConsumptionLimitation => "consumption-limitation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    Timeout,
    Unreachable,
    /// Any other failure; carries the HTTP status when one was received.
    Unexpected(Option<u16>),
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::Unreachable => f.write_str("unreachable"),
            Self::Unexpected(Some(code)) => write!(f, "unexpected status {code}"),
            Self::Unexpected(None) => f.write_str("unexpected error"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("analysis service unavailable: {0}")]
    Unavailable(Unavailable),
    #[error("analysis service rejected the query as invalid")]
    InvalidQuery,
    #[error("analysis endpoint not found")]
    EndpointNotFound,
}

impl AnalysisError {
    /// Status reported to the caller for this outcome.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unavailable(Unavailable::Timeout) => 504,
            Self::Unavailable(Unavailable::Unreachable) => 503,
            Self::Unavailable(Unavailable::Unexpected(_)) => 500,
            Self::InvalidQuery => 400,
            Self::EndpointNotFound => 404,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(Unavailable::Timeout) => "timeout",
            Self::Unavailable(Unavailable::Unreachable) => "unreachable",
            Self::Unavailable(Unavailable::Unexpected(_)) => "unexpected",
            Self::InvalidQuery => "invalid_query",
            Self::EndpointNotFound => "endpoint_not_found",
        }
    }

    /// Human-readable message, including the upstream status when known.
    pub fn message(&self) -> String {
        match self {
            Self::Unavailable(Unavailable::Timeout) => "analysis service timed out".to_string(),
            Self::Unavailable(Unavailable::Unreachable) => "analysis service is unreachable".to_string(),
            Self::Unavailable(Unavailable::Unexpected(Some(code))) => {
                format!("unexpected response from analysis service (code {code})")
            }
            Self::Unavailable(Unavailable::Unexpected(None)) => {
                "unexpected error calling analysis service".to_string()
            }
            Self::InvalidQuery => "analysis service rejected the input data".to_string(),
            Self::EndpointNotFound => "analysis endpoint not found".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy { code: u16 },
    Timeout,
    Unreachable,
}

#[async_trait::async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn call(&self, endpoint: Endpoint, payload: &Payload) -> Result<Value, AnalysisError>;

    async fn health(&self) -> HealthStatus;
}
