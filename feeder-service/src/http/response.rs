use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::analysis::{AnalysisError, QueryError};
use crate::pipeline::ImportError;
use crate::resolver::RepositoryError;
use crate::sources::SourceError;

/// Body shape shared by every route: `{status, message, data}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    pub message: String,
    pub data: T,
}

pub fn success<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    envelope(StatusCode::OK, "success", message, data)
}

pub fn envelope<T: Serialize>(code: StatusCode, status: &'static str, message: impl Into<String>, data: T) -> Response {
    (
        code,
        Json(Envelope {
            status,
            message: message.into(),
            data,
        }),
    )
        .into_response()
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("administrator access required")]
    Forbidden,
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) | Self::Query(_) => StatusCode::BAD_REQUEST,
            Self::Analysis(e) => StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Import(ImportError::Source(_)) => StatusCode::BAD_REQUEST,
            Self::Import(_) | Self::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SourceError> for ApiError {
    fn from(e: SourceError) -> Self {
        Self::Import(ImportError::Source(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status();
        if code.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }

        let message = match &self {
            Self::Analysis(e) => e.message(),
            other => other.to_string(),
        };
        envelope(code, "error", message, json!({}))
    }
}
