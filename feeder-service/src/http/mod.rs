//! Thin axum boundary over the import pipeline, the resolver and the
//! analysis aggregator.

pub mod response;

use std::sync::Arc;

use axum::{
    async_trait,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::analysis::{AnalysisParams, AnalysisQuery, Aggregator, ComparisonQuery, HealthStatus, LimitationQuery, SingleResult};
use crate::pipeline::{ConsumptionImporter, FeederImporter};
use crate::resolver::FeederResolver;
use crate::tenant::{lookup_regions, Identity, RegionAnswer, RegionQuery, TenantScopeResolver};

pub use response::{ApiError, Envelope};
use response::{envelope, success};

#[derive(Clone)]
pub struct AppState {
    pub scope: Arc<TenantScopeResolver>,
    pub resolver: FeederResolver,
    pub importer: Arc<ConsumptionImporter>,
    pub feeders: Arc<FeederImporter>,
    pub aggregator: Arc<Aggregator>,
    pub analysis_base_url: String,
}

/// Identity behind the request's bearer token.
pub struct Caller(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(ApiError::Unauthenticated)?;

        state
            .scope
            .authenticate(token)
            .cloned()
            .map(Caller)
            .ok_or(ApiError::Unauthenticated)
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/health", get(health).post(health))
        .route("/api/check-analysis-status", post(check_analysis_status))
        .route("/api/fidder-analysis", post(fidder_analysis))
        .route("/api/compare-energetic", post(compare_energetic))
        .route("/api/consumption-distribution", post(consumption_distribution))
        .route("/api/consumption-limitation", post(consumption_limitation))
        .route("/api/get-fidder-region", post(get_fidder_region))
        .route("/api/get-private-companies", post(get_private_companies))
        .route("/api/import-power-consumption", post(import_power_consumption))
        .route("/api/import-feeders", post(import_feeders))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Parse a JSON body; an empty body reads as the type's default.
fn json_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn health() -> Response {
    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
    success("", json!({ "status": "healthy", "timestamp": timestamp }))
}

async fn check_analysis_status(State(state): State<AppState>) -> Response {
    let health = state.aggregator.health().await;
    let (status, message) = match &health {
        HealthStatus::Healthy => ("success", "analysis service is reachable".to_string()),
        HealthStatus::Unhealthy { code } => ("warning", format!("analysis service answered with code {code}")),
        HealthStatus::Timeout => ("error", "analysis service did not answer in time".to_string()),
        HealthStatus::Unreachable => ("error", "analysis service is unreachable".to_string()),
    };

    let mut data = serde_json::to_value(&health).unwrap_or_else(|_| json!({}));
    data["message"] = Value::String(message);
    data["api_url"] = Value::String(state.analysis_base_url.clone());
    envelope(StatusCode::OK, status, "", data)
}

async fn fidder_analysis(
    State(state): State<AppState>,
    Caller(identity): Caller,
    body: Bytes,
) -> Result<Response, ApiError> {
    let params: AnalysisParams = json_body(&body)?;
    let scope = state.scope.resolve(&identity, params.company_names());
    let query = AnalysisQuery::parse(&params, scope.is_admin())?;

    let result = state.aggregator.run_analysis(&scope, &query).await;
    Ok(success("", result))
}

/// Standard tenants get the single result under `key`; administrative
/// results are already keyed by company.
fn single(key: &str, result: SingleResult) -> Response {
    match result {
        SingleResult::Direct(value) => {
            let mut data = serde_json::Map::new();
            data.insert(key.to_string(), value);
            success("", data)
        }
        SingleResult::Companies(by_company) => success("", by_company),
    }
}

async fn compare_energetic(
    State(state): State<AppState>,
    Caller(identity): Caller,
    body: Bytes,
) -> Result<Response, ApiError> {
    let params: AnalysisParams = json_body(&body)?;
    let scope = state.scope.resolve(&identity, params.company_names());
    let query = ComparisonQuery::parse(&params, scope.is_admin())?;

    let result = state.aggregator.run_comparison(&scope, &query).await?;
    Ok(single("energy_comparison", result))
}

async fn consumption_distribution(
    State(state): State<AppState>,
    Caller(identity): Caller,
    body: Bytes,
) -> Result<Response, ApiError> {
    let params: AnalysisParams = json_body(&body)?;
    let scope = state.scope.resolve(&identity, params.company_names());
    let query = AnalysisQuery::parse(&params, scope.is_admin())?;

    let result = state.aggregator.run_distribution(&scope, &query).await?;
    Ok(single("consumption_distribution", result))
}

async fn consumption_limitation(
    State(state): State<AppState>,
    Caller(identity): Caller,
    body: Bytes,
) -> Result<Response, ApiError> {
    let params: AnalysisParams = json_body(&body)?;
    let scope = state.scope.resolve(&identity, params.company_names());
    let query = LimitationQuery::parse(&params, scope.is_admin())?;

    let result = state.aggregator.run_limitation(&scope, &query).await?;
    Ok(single("consumption_limitation", result))
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn region_code(v: &Value) -> Result<i64, ApiError> {
    let bad = || ApiError::BadRequest(format!("region code {v} is not an integer"));
    match v {
        Value::Number(n) => n.as_i64().ok_or_else(bad),
        Value::String(s) => s.trim().parse().map_err(|_| bad()),
        _ => Err(bad()),
    }
}

/// Which lookup a region request asks for: regions take precedence over a
/// feeder, and an empty request lists everything.
fn region_query(body: &Value) -> Result<RegionQuery, ApiError> {
    if let Some(regions) = body.get("region_code").filter(|v| truthy(v)) {
        return match regions {
            Value::Array(items) => Ok(RegionQuery::Regions(
                items.iter().map(region_code).collect::<Result<_, _>>()?,
            )),
            single => Ok(RegionQuery::Region(region_code(single)?)),
        };
    }
    match body.get("fidder_code").filter(|v| truthy(v)) {
        Some(Value::String(s)) => Ok(RegionQuery::Feeder(s.trim().to_string())),
        Some(other) => Ok(RegionQuery::Feeder(other.to_string())),
        None => Ok(RegionQuery::All),
    }
}

fn region_answer_json(answer: RegionAnswer) -> Value {
    match answer {
        RegionAnswer::Catalog(c) => json!({ "fidders": c.feeders, "regions": c.regions }),
        RegionAnswer::Region { region, feeders } => json!({
            "region_code": region,
            "total_fidders": feeders.len(),
            "fidders": feeders,
        }),
        RegionAnswer::Regions { requested, feeders } => json!({
            "processing_summary": format!(
                "Processed {} regions, found feeders in {} regions",
                requested.len(),
                feeders.resolved_regions.len()
            ),
            "region_codes": feeders.resolved_regions,
            "total_fidders": feeders.all_feeders.len(),
            "fidders": feeders.all_feeders,
            "region_fidder_map": feeders.region_map,
            "requested_regions": requested,
        }),
        RegionAnswer::Feeder { feeder, regions } => json!({
            "fidder_code": feeder,
            "total_regions": regions.len(),
            "regions": regions,
        }),
    }
}

async fn get_fidder_region(
    State(state): State<AppState>,
    Caller(identity): Caller,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body: Value = json_body(&body)?;
    let query = region_query(&body)?;

    let answer = lookup_regions(state.scope.override_for(&identity), &state.resolver, query).await?;
    Ok(success("", region_answer_json(answer)))
}

async fn get_private_companies(State(state): State<AppState>, Caller(_): Caller) -> Response {
    success("", json!({ "company_names": state.scope.directory().private_names() }))
}

/// The CSV export is the raw request body. Its layout follows the
/// caller's tenant class.
async fn import_power_consumption(
    State(state): State<AppState>,
    Caller(identity): Caller,
    body: Bytes,
) -> Result<Response, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("missing CSV body".to_string()));
    }
    let scope = state.scope.resolve(&identity, &[]);
    let variant = scope.import_variant();
    tracing::info!(tenant_id = scope.tenant_id, variant = variant.as_str(), bytes = body.len(), "import requested");

    let summary = state.importer.import(variant, body.to_vec()).await?;
    Ok(success("Import completed", summary))
}

async fn import_feeders(
    State(state): State<AppState>,
    Caller(identity): Caller,
    body: Bytes,
) -> Result<Response, ApiError> {
    if !state.scope.is_admin(&identity) {
        return Err(ApiError::Forbidden);
    }
    if body.is_empty() {
        return Err(ApiError::BadRequest("missing CSV body".to_string()));
    }

    let summary = state.feeders.import(&body).await?;
    Ok(success("Import completed", summary))
}
