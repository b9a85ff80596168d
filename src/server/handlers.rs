//! HTTP request handlers for API endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use super::error::ApiError;
use super::state::AppState;
use crate::analysis::RuleTable;
use crate::dsl::ParsedQuery;
use crate::engine::AnalysisRequest;
use crate::result::AnalysisResponse;

/// Health check endpoint
///
/// Returns a simple status response to verify the server is running
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok"
    }))
}

/// GET /analysis-types - The loaded rule table
pub async fn list_analysis_types(State(state): State<Arc<AppState>>) -> Json<RuleTable> {
    Json(state.engine.rules().clone())
}

/// POST /analyze - Run an analysis request
///
/// Traversal is CPU-bound, so it runs on the blocking pool.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Json(request) = payload?;
    tracing::debug!(query = %request.query, scenarios = request.scenarios.len(), "Analyze request");

    let engine = Arc::clone(&state.engine);
    let response = tokio::task::spawn_blocking(move || engine.analyze(&request)).await??;
    Ok(Json(response))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParseRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParseResponse {
    pub query_parsed: ParsedQuery,
}

/// POST /parse - Parse a query without running it
pub async fn parse_query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ParseRequest>, JsonRejection>,
) -> Result<Json<ParseResponse>, ApiError> {
    let Json(request) = payload?;
    let query_parsed = state.engine.parse_query(&request.query)?;
    Ok(Json(ParseResponse { query_parsed }))
}
