//! Error types for the REST API server

use crate::error::{AnalysisError, ErrorResponse};
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// The analysis pipeline rejected the request
    Analysis(AnalysisError),
    /// Request body is not valid JSON for the endpoint
    InvalidBody(String),
    /// Internal server error
    InternalError(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Analysis(err) => write!(f, "{}", err),
            ApiError::InvalidBody(msg) => write!(f, "Invalid request body: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Analysis(
                AnalysisError::Parse(_) | AnalysisError::Schema(_) | AnalysisError::Validation(_),
            )
            | ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Analysis(AnalysisError::ComputeTimeout(_) | AnalysisError::Config(_))
            | ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Analysis(err) => ErrorResponse::from(err),
            ApiError::InvalidBody(msg) => ErrorResponse {
                error: true,
                error_type: "validation_error",
                message: self.to_string(),
                details: json!({ "kind": "body", "reason": msg }),
            },
            ApiError::InternalError(_) => ErrorResponse {
                error: true,
                error_type: "compute_error",
                message: self.to_string(),
                details: json!({ "kind": "internal" }),
            },
        };

        if status.is_server_error() {
            tracing::warn!(error = %self, "Request failed");
        }

        (status, Json(body)).into_response()
    }
}

// Conversions from other error types

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        ApiError::Analysis(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::InternalError(format!("Analysis task failed: {}", err))
    }
}
