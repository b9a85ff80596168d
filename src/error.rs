//! Error taxonomy for the analytics engine
//!
//! Every failure surfaced by a request maps onto one of the wire error types
//! (`parse_error`, `validation_error`, `compute_error`).

use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Kind of DSL parse failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    Syntax,
}

/// Malformed DSL query or edge condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Byte offset of the offending fragment within the input
    pub position: usize,
    /// The offending substring
    pub fragment: String,
}

impl ParseError {
    pub fn syntax(message: impl Into<String>, position: usize, fragment: impl Into<String>) -> Self {
        ParseError {
            kind: ParseErrorKind::Syntax,
            message: message.into(),
            position,
            fragment: fragment.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at position {} (near '{}')",
            self.message, self.position, self.fragment
        )
    }
}

impl std::error::Error for ParseError {}

/// Malformed analysis rule table, raised when the adaptor is constructed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The table has no rules at all
    EmptyRuleTable,
    /// The final rule is not an unconditional fallback
    MissingFallback(String),
    /// An unconditional rule appears before the end of the table
    FallbackNotLast(String),
    /// Two rules share an id
    DuplicateRule(String),
    /// The table could not be read or deserialized
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EmptyRuleTable => write!(f, "Rule table is empty"),
            ConfigError::MissingFallback(id) => write!(
                f,
                "Rule table must end with an unconditional fallback (last rule is '{}')",
                id
            ),
            ConfigError::FallbackNotLast(id) => write!(
                f,
                "Unconditional rule '{}' shadows every rule after it",
                id
            ),
            ConfigError::DuplicateRule(id) => write!(f, "Duplicate rule id '{}'", id),
            ConfigError::Invalid(msg) => write!(f, "Invalid rule table: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Traversal exceeded its step or wall-clock ceiling
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeTimeout {
    pub steps: u64,
    pub elapsed: Duration,
    pub max_steps: u64,
    pub max_duration: Duration,
}

impl std::fmt::Display for ComputeTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Traversal exceeded its bound after {} steps in {:?} (limits: {} steps, {:?})",
            self.steps, self.elapsed, self.max_steps, self.max_duration
        )
    }
}

impl std::error::Error for ComputeTimeout {}

/// Error types for an analysis request
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Malformed DSL
    Parse(ParseError),
    /// Malformed or inconsistent graph
    Schema(String),
    /// Referenced entity missing or value out of range
    Validation(String),
    /// Traversal bound exceeded
    ComputeTimeout(ComputeTimeout),
    /// Rule table rejected at load time
    Config(ConfigError),
}

impl AnalysisError {
    /// Wire-level error type
    pub fn error_type(&self) -> &'static str {
        match self {
            AnalysisError::Parse(_) => "parse_error",
            AnalysisError::Schema(_) | AnalysisError::Validation(_) => "validation_error",
            AnalysisError::ComputeTimeout(_) | AnalysisError::Config(_) => "compute_error",
        }
    }

    /// Structured details for the error payload
    pub fn details(&self) -> Value {
        match self {
            AnalysisError::Parse(err) => json!({
                "kind": err.kind,
                "position": err.position,
                "fragment": err.fragment,
            }),
            AnalysisError::Schema(_) => json!({ "kind": "schema" }),
            AnalysisError::Validation(_) => json!({ "kind": "validation" }),
            AnalysisError::ComputeTimeout(timeout) => json!({
                "kind": "timeout",
                "steps": timeout.steps,
                "elapsed_ms": timeout.elapsed.as_millis() as u64,
            }),
            AnalysisError::Config(_) => json!({ "kind": "config" }),
        }
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::Parse(err) => write!(f, "Parse error: {}", err),
            AnalysisError::Schema(msg) => write!(f, "Schema error: {}", msg),
            AnalysisError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AnalysisError::ComputeTimeout(err) => write!(f, "Compute timeout: {}", err),
            AnalysisError::Config(err) => write!(f, "Config error: {}", err),
        }
    }
}

impl std::error::Error for AnalysisError {}

impl From<ParseError> for AnalysisError {
    fn from(err: ParseError) -> Self {
        AnalysisError::Parse(err)
    }
}

impl From<ConfigError> for AnalysisError {
    fn from(err: ConfigError) -> Self {
        AnalysisError::Config(err)
    }
}

impl From<ComputeTimeout> for AnalysisError {
    fn from(err: ComputeTimeout) -> Self {
        AnalysisError::ComputeTimeout(err)
    }
}

/// Error payload returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: bool,
    pub error_type: &'static str,
    pub message: String,
    pub details: Value,
}

impl From<&AnalysisError> for ErrorResponse {
    fn from(err: &AnalysisError) -> Self {
        ErrorResponse {
            error: true,
            error_type: err.error_type(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}
