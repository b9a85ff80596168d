//! Analysis engine
//!
//! Runs the full pipeline for one request: parse the query, build the
//! graph, compute predicates, pick a rule, prune, evaluate every scenario
//! and assemble the response.

use crate::analysis::{AnalysisAdaptor, PlanContext, RuleTable, RunnerRegistry};
use crate::dsl::{self, ParsedQuery};
use crate::error::{AnalysisError, ConfigError};
use crate::graph::{FunnelGraph, GraphJson};
use crate::overrides::{ParamOverrides, ResolvedOverrides};
use crate::predicates::SelectionPredicates;
use crate::pruning::PrunedGraph;
use crate::result::{AnalysisResponse, ResultAssembler};
use crate::runner::{PathRunner, TraversalLimits};
use crate::scenarios::{PreparedScenario, ScenarioOrchestrator, ScenarioParams};
use daggy::NodeIndex;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Engine-wide settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub limits: TraversalLimits,
    /// Upper bound on concurrently evaluated scenarios
    pub max_workers: usize,
    pub memoize: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            limits: TraversalLimits::default(),
            max_workers: 8,
            memoize: true,
        }
    }
}

/// One analysis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub graph: GraphJson,
    pub query: String,
    #[serde(default)]
    pub scenarios: Vec<ScenarioParams>,
    #[serde(default)]
    pub what_if_overrides: ParamOverrides,
}

/// Stateless between requests; safe to share behind an `Arc`.
#[derive(Debug)]
pub struct AnalysisEngine {
    adaptor: AnalysisAdaptor,
    runners: RunnerRegistry,
    config: EngineConfig,
}

impl AnalysisEngine {
    pub fn new(rules: RuleTable, config: EngineConfig) -> Result<Self, ConfigError> {
        Ok(AnalysisEngine {
            adaptor: AnalysisAdaptor::new(rules)?,
            runners: RunnerRegistry::new(),
            config,
        })
    }

    pub fn with_default_rules(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::new(RuleTable::embedded()?, config)
    }

    pub fn rules(&self) -> &RuleTable {
        self.adaptor.table()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn parse_query(&self, query: &str) -> Result<ParsedQuery, AnalysisError> {
        Ok(dsl::parse(query)?)
    }

    /// Runs one request end to end.
    ///
    /// # Errors
    /// Parse, schema, validation and config failures abort the request.
    /// Per-scenario timeouts are reported inside the response instead.
    pub fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        let started = Instant::now();
        let query = dsl::parse(&request.query)?;
        let graph = FunnelGraph::build(&request.graph)?;

        let selected = query.selected_nodes();
        if selected.is_empty() {
            return Err(AnalysisError::Validation(
                "Query selects no nodes".to_string(),
            ));
        }
        let predicates = SelectionPredicates::compute(&graph, &selected)?.with_query(&query);
        let selection = selected
            .iter()
            .map(|id| graph.require_node(id))
            .collect::<Result<Vec<NodeIndex>, _>>()?;

        let rule = self.adaptor.match_predicates(&predicates);
        let analysis = self.runners.runner(rule.runner)?;
        let plan = analysis.plan(&PlanContext {
            graph: &graph,
            query: &query,
            predicates: &predicates,
            selection: &selection,
        })?;
        debug!(rule = %rule.id, runner = %rule.runner, "Planned analysis");

        let pruned = PrunedGraph::from_query(&graph, &query)?;
        let orchestrator = ScenarioOrchestrator::new(self.config.max_workers);
        // Variants pinned in the query hold in every scenario
        let query_cases = ResolvedOverrides::from_query_cases(&graph, &query.cases)?;
        let prepared: Vec<PreparedScenario> = orchestrator
            .prepare(&graph, &request.scenarios, &request.what_if_overrides)?
            .into_iter()
            .map(|scenario| PreparedScenario {
                overrides: scenario.overrides.overlay(&query_cases),
                ..scenario
            })
            .collect();

        let runs = orchestrator.run(&prepared, |overrides| {
            let runner = PathRunner::new(&pruned, overrides, &query.context, self.config.limits)
                .with_memoization(self.config.memoize);
            analysis.execute(&plan, &runner)
        });

        let response = ResultAssembler {
            graph: &graph,
            rule,
            query: &query,
            predicates: &predicates,
            plan: &plan,
            pruned_edges: pruned.pruned_edges(),
        }
        .assemble(runs);

        info!(
            rule = %rule.id,
            scenarios = response.results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis complete"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::branching_graph;

    fn request(query: &str) -> AnalysisRequest {
        AnalysisRequest {
            graph: branching_graph(),
            query: query.to_string(),
            scenarios: Vec::new(),
            what_if_overrides: ParamOverrides::default(),
        }
    }

    fn engine() -> AnalysisEngine {
        AnalysisEngine::with_default_rules(EngineConfig::default()).unwrap()
    }

    #[test]
    fn path_between_nodes() {
        let response = engine().analyze(&request("from(A).to(C).visited(B1)")).unwrap();
        assert_eq!(response.analysis_type, "path_between");
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].scenario_id, "default");
        assert!((response.results[0].probability - 1.0).abs() < 1e-12);
        assert_eq!(response.metadata.pruned_edges, vec!["A->B2", "A->B3"]);
    }

    #[test]
    fn parse_errors_abort() {
        let err = engine().analyze(&request("from(A")).unwrap_err();
        assert_eq!(err.error_type(), "parse_error");
    }

    #[test]
    fn empty_selection_is_rejected() {
        let err = engine().analyze(&request("context(channel:paid)")).unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
    }

    #[test]
    fn query_case_must_name_a_known_variant() {
        let mut json = branching_graph();
        json.nodes[1].case = serde_json::from_str(
            r#"{"id": "promo", "variants": [{"name": "on", "weight": 0.5}, {"name": "off", "weight": 0.5}]}"#,
        )
        .unwrap();
        let mut request = request("from(A).to(C).case(promo:maybe)");
        request.graph = json;
        let err = engine().analyze(&request).unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(msg) if msg.contains("promo:maybe")));

        request.query = "from(A).to(C).case(promo:on).case(promo:off)".to_string();
        let err = engine().analyze(&request).unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(msg) if msg.contains("both")));

        request.query = "from(A).to(C).case(promo:on)".to_string();
        assert!(engine().analyze(&request).is_ok());
    }

    #[test]
    fn unknown_node_is_validation_error() {
        let err = engine().analyze(&request("from(A).to(Nope)")).unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(msg) if msg.contains("Nope")));
    }
}
