use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde_json::Value;

use super::{AnalysisBackend, AnalysisError, Endpoint, HealthStatus, Payload, Unavailable};

fn classify(e: &reqwest::Error) -> AnalysisError {
    if e.is_timeout() {
        AnalysisError::Unavailable(Unavailable::Timeout)
    } else if e.is_connect() {
        AnalysisError::Unavailable(Unavailable::Unreachable)
    } else {
        AnalysisError::Unavailable(Unavailable::Unexpected(e.status().map(|s| s.as_u16())))
    }
}

/// JSON-over-HTTP client for the analysis service.
///
/// Every call has its own timeout and is never retried.
#[derive(Clone)]
pub struct HttpAnalysisClient {
    http: reqwest::Client,
    base_url: String,
    health_timeout: Duration,
}

impl HttpAnalysisClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, health_timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            health_timeout,
        })
    }

    async fn post(&self, endpoint: Endpoint, payload: &Payload) -> Result<Value, AnalysisError> {
        let url = format!("{}/{}", self.base_url, endpoint.path());
        tracing::debug!(%url, "calling analysis service");

        let resp = self.http.post(&url).json(payload).send().await.map_err(|e| classify(&e))?;

        match resp.status() {
            StatusCode::OK => resp.json::<Value>().await.map_err(|e| classify(&e)),
            StatusCode::UNPROCESSABLE_ENTITY => Err(AnalysisError::InvalidQuery),
            StatusCode::NOT_FOUND => Err(AnalysisError::EndpointNotFound),
            other => Err(AnalysisError::Unavailable(Unavailable::Unexpected(Some(other.as_u16())))),
        }
    }
}

#[async_trait::async_trait]
impl AnalysisBackend for HttpAnalysisClient {
    async fn call(&self, endpoint: Endpoint, payload: &Payload) -> Result<Value, AnalysisError> {
        let path = endpoint.path();
        metrics::counter!("analysis_requests_total", "endpoint" => path).increment(1);

        let started = Instant::now();
        let result = self.post(endpoint, payload).await;
        metrics::histogram!("analysis_request_duration_seconds", "endpoint" => path)
            .record(started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            metrics::counter!("analysis_failures_total", "endpoint" => path, "kind" => e.kind()).increment(1);
            tracing::debug!(endpoint = path, error = %e, "analysis call failed");
        }
        result
    }

    async fn health(&self) -> HealthStatus {
        let url = format!("{}/health", self.base_url);
        match self.http.get(&url).timeout(self.health_timeout).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => HealthStatus::Healthy,
            Ok(resp) => HealthStatus::Unhealthy {
                code: resp.status().as_u16(),
            },
            Err(e) if e.is_timeout() => HealthStatus::Timeout,
            Err(e) => {
                tracing::warn!(error = %e, "analysis health check failed");
                HealthStatus::Unreachable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::*;
    use crate::analysis::payload::{ProfileMethod, ProfilePayload, RangePayload};

    fn range() -> RangePayload {
        RangePayload {
            company_id: vec![3],
            start_date: "2024-03-20".to_string(),
            end_date: "2024-03-22".to_string(),
            region_code: vec![1],
            fidder_code: vec![1],
        }
    }

    fn payload() -> Payload {
        Payload::Range(range())
    }

    fn client(url: String) -> HttpAnalysisClient {
        HttpAnalysisClient::new(url, Duration::from_secs(5), Duration::from_secs(1)).unwrap()
    }

    #[tokio::test]
    async fn posts_json_and_decodes_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/daily-profile")
            .match_body(Matcher::PartialJson(json!({"company_id": [3], "method": "max"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"profile": [1.0, 2.0]}).to_string())
            .create_async()
            .await;

        let body = Payload::Profile(ProfilePayload {
            range: range(),
            method: ProfileMethod::Max,
        });
        let out = client(server.url()).call(Endpoint::DailyProfile, &body).await.unwrap();

        assert_eq!(out, json!({"profile": [1.0, 2.0]}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn maps_error_statuses() {
        let mut server = Server::new_async().await;
        let _invalid = server.mock("POST", "/daily-peak").with_status(422).create_async().await;
        let _missing = server.mock("POST", "/weekly-peak").with_status(404).create_async().await;
        let _broken = server.mock("POST", "/long-term").with_status(502).create_async().await;

        let c = client(server.url());
        assert_eq!(c.call(Endpoint::DailyPeak, &payload()).await, Err(AnalysisError::InvalidQuery));
        assert_eq!(c.call(Endpoint::WeeklyPeak, &payload()).await, Err(AnalysisError::EndpointNotFound));

        let err = c.call(Endpoint::LongTerm, &payload()).await.unwrap_err();
        assert_eq!(err, AnalysisError::Unavailable(Unavailable::Unexpected(Some(502))));
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn unreachable_host_is_reported_as_unavailable() {
        // Nothing listens on the discard port.
        let c = client("http://127.0.0.1:9".to_string());
        let err = c.call(Endpoint::DailyPeak, &payload()).await.unwrap_err();

        assert_eq!(err, AnalysisError::Unavailable(Unavailable::Unreachable));
        assert_eq!(err.status_code(), 503);
        assert_eq!(c.health().await, HealthStatus::Unreachable);
    }

    #[tokio::test]
    async fn health_reports_status() {
        let mut server = Server::new_async().await;
        let _ok = server.mock("GET", "/health").with_status(200).create_async().await;
        assert_eq!(client(server.url()).health().await, HealthStatus::Healthy);

        let mut server = Server::new_async().await;
        let _down = server.mock("GET", "/health").with_status(503).create_async().await;
        assert_eq!(client(server.url()).health().await, HealthStatus::Unhealthy { code: 503 });
    }

    #[tokio::test]
    async fn trailing_slash_in_base_url_is_ignored() {
        let mut server = Server::new_async().await;
        let mock = server.mock("GET", "/health").with_status(200).create_async().await;

        let c = client(format!("{}/", server.url()));
        assert_eq!(c.health().await, HealthStatus::Healthy);
        mock.assert_async().await;
    }
}
