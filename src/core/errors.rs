use std::time::Duration;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Failure of a single pipeline request.
///
/// Every stage of the classifier and chatbot pipelines reports one of these;
/// the HTTP layer maps it onto an [`ApiError`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("stage '{stage}' timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        PipelineError::Storage(err.to_string())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Provider(_) => "provider",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Parse(_) => "parse",
            PipelineError::Validation(_) => "validation",
            PipelineError::Storage(_) => "storage",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unprocessable entity: {0}")]
    Unprocessable(String),
    #[error("bad gateway: {0}")]
    BadGateway(String),
    #[error("gateway timeout: {0}")]
    GatewayTimeout(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        match err {
            PipelineError::Provider(_) => ApiError::BadGateway(message),
            PipelineError::NotFound(msg) => ApiError::NotFound(msg),
            PipelineError::Validation(msg) => ApiError::Unprocessable(msg),
            PipelineError::Timeout { .. } => ApiError::GatewayTimeout(message),
            PipelineError::Parse(_) | PipelineError::Storage(_) | PipelineError::Internal(_) => {
                ApiError::Internal(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
