//! Shared application state for the API server

use crate::engine::AnalysisEngine;
use std::sync::Arc;

/// Shared application state
#[derive(Clone, Debug)]
pub struct AppState {
    /// Immutable engine shared by every request
    pub engine: Arc<AnalysisEngine>,
}

impl AppState {
    /// Creates a new application state
    pub fn new(engine: AnalysisEngine) -> Self {
        AppState {
            engine: Arc::new(engine),
        }
    }
}
