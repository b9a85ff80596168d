//! Funnel analytics
//!
//! Answers probability and cost questions over a user-built funnel graph:
//! a query DSL selects nodes, a rule table picks the analysis, clauses
//! prune and renormalize the graph, and a path runner computes reach
//! probabilities and expected costs for every requested scenario.

pub mod analysis;
pub mod dsl;
pub mod engine;
pub mod error;
pub mod graph;
pub mod overrides;
pub mod predicates;
pub mod pruning;
pub mod result;
pub mod runner;
pub mod scenarios;
pub mod server;


pub use analysis::{AnalysisAdaptor, AnalysisDefinition, RuleTable, RunnerKind};
pub use dsl::{parse, parse_condition, ParsedQuery};
pub use engine::{AnalysisEngine, AnalysisRequest, EngineConfig};
pub use error::{AnalysisError, ComputeTimeout, ConfigError, ErrorResponse, ParseError};
pub use graph::{FunnelGraph, GraphJson};
pub use overrides::ParamOverrides;
pub use predicates::SelectionPredicates;
pub use pruning::{prune, PrunedGraph};
pub use result::{AnalysisResponse, ScenarioResult};
pub use runner::{PathResult, PathRunner, TraversalLimits};
pub use scenarios::ScenarioParams;
pub use server::{run_server, ApiError, AppState, ServerConfig};
