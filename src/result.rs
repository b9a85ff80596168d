//! Result assembly
//!
//! Shapes scenario runs into per-scenario results, a dimensional data table
//! and request metadata. The shape is the same for one or many scenarios.

use crate::analysis::{AnalysisDefinition, BreakdownEntry, DimensionKind, RunPlan, RunnerKind};
use crate::dsl::ParsedQuery;
use crate::error::{AnalysisError, ErrorResponse};
use crate::graph::{CostUnits, FunnelGraph};
use crate::predicates::SelectionPredicates;
use crate::runner::TraversalStats;
use crate::scenarios::ScenarioRun;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostSummary {
    pub monetary: f64,
    pub time: f64,
    pub units: CostUnits,
}

/// One entry of `results`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioResult {
    pub scenario_id: String,
    pub scenario_name: String,
    pub probability: f64,
    pub expected_costs: CostSummary,
    pub pruned_edges: Vec<String>,
    pub path_nodes: Vec<String>,
    pub unreachable: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub breakdown: Vec<BreakdownEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
    pub stats: TraversalStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionValue {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dimension {
    pub id: String,
    pub values: Vec<DimensionValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metric {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataRow {
    /// dimension id -> dimension value id
    pub coordinates: BTreeMap<String, String>,
    /// metric id -> value
    pub values: BTreeMap<String, f64>,
}

/// Dimensional table of all scenario results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionalData {
    pub dimensions: Vec<Dimension>,
    pub metrics: Vec<Metric>,
    pub rows: Vec<DataRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMetadata {
    pub request_id: Uuid,
    pub computed_at: DateTime<Utc>,
    pub rule_id: String,
    pub runner: RunnerKind,
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub targets: Vec<String>,
    pub visited: Vec<String>,
    pub visited_any: Vec<Vec<String>>,
    pub exclude: Vec<String>,
    pub selected_nodes: Vec<String>,
    pub pruned_edges: Vec<String>,
    pub predicates: SelectionPredicates,
    pub scenario_count: usize,
}

/// Full analysis response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResponse {
    pub analysis_type: String,
    pub analysis_name: String,
    pub query_parsed: ParsedQuery,
    pub results: Vec<ScenarioResult>,
    pub data: DimensionalData,
    pub metadata: ResponseMetadata,
}

/// Request-level facts shared by every scenario
pub struct ResultAssembler<'a> {
    pub graph: &'a FunnelGraph,
    pub rule: &'a AnalysisDefinition,
    pub query: &'a ParsedQuery,
    pub predicates: &'a SelectionPredicates,
    pub plan: &'a RunPlan,
    pub pruned_edges: Vec<String>,
}

impl ResultAssembler<'_> {
    pub fn assemble(&self, runs: Vec<ScenarioRun>) -> AnalysisResponse {
        let units = self.graph.cost_units().clone();
        let results: Vec<ScenarioResult> = runs
            .into_iter()
            .map(|run| self.scenario_result(run, &units))
            .collect();
        let data = dimensional_data(&results, &units);

        let targets: Vec<String> = self
            .plan
            .targets
            .iter()
            .map(|&n| self.graph.node_id(n).to_string())
            .collect();
        let metadata = ResponseMetadata {
            request_id: Uuid::new_v4(),
            computed_at: Utc::now(),
            rule_id: self.rule.id.clone(),
            runner: self.rule.runner,
            from: self.graph.node_id(self.plan.origin).to_string(),
            to: match targets.as_slice() {
                [only] => Some(only.clone()),
                _ => None,
            },
            targets,
            visited: self.query.visited.clone(),
            visited_any: self.query.visited_any.clone(),
            exclude: self.query.exclude.clone(),
            selected_nodes: self.query.selected_nodes(),
            pruned_edges: self.pruned_edges.clone(),
            predicates: self.predicates.clone(),
            scenario_count: results.len(),
        };

        AnalysisResponse {
            analysis_type: self.rule.id.clone(),
            analysis_name: self.rule.name.clone(),
            query_parsed: self.query.clone(),
            results,
            data,
            metadata,
        }
    }

    fn scenario_result(&self, run: ScenarioRun, units: &CostUnits) -> ScenarioResult {
        match run.outcome {
            Ok(outcome) => ScenarioResult {
                scenario_id: run.scenario_id,
                scenario_name: run.name,
                probability: outcome.probability,
                expected_costs: CostSummary {
                    monetary: outcome.expected_costs.monetary,
                    time: outcome.expected_costs.time,
                    units: units.clone(),
                },
                pruned_edges: self.pruned_edges.clone(),
                path_nodes: outcome.path_nodes,
                unreachable: outcome.unreachable,
                breakdown: outcome.breakdown,
                error: None,
                stats: outcome.stats,
            },
            Err(timeout) => {
                let steps = timeout.steps;
                let error = AnalysisError::ComputeTimeout(timeout);
                ScenarioResult {
                    scenario_id: run.scenario_id,
                    scenario_name: run.name,
                    probability: 0.0,
                    expected_costs: CostSummary {
                        monetary: 0.0,
                        time: 0.0,
                        units: units.clone(),
                    },
                    pruned_edges: self.pruned_edges.clone(),
                    path_nodes: Vec::new(),
                    unreachable: false,
                    breakdown: Vec::new(),
                    error: Some(ErrorResponse::from(&error)),
                    stats: TraversalStats {
                        steps,
                        ..TraversalStats::default()
                    },
                }
            }
        }
    }
}

fn push_value(values: &mut Vec<DimensionValue>, id: &str, label: Option<&String>) {
    if !values.iter().any(|v| v.id == id) {
        values.push(DimensionValue {
            id: id.to_string(),
            label: label.cloned(),
        });
    }
}

fn metric_values(probability: f64, monetary: f64, time: f64) -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("probability".to_string(), probability),
        ("expected_cost_monetary".to_string(), monetary),
        ("expected_cost_time".to_string(), time),
    ])
}

fn dimensional_data(results: &[ScenarioResult], units: &CostUnits) -> DimensionalData {
    let mut scenarios = Vec::with_capacity(results.len());
    let mut breakdown_kind: Option<DimensionKind> = None;
    let mut breakdown_values = Vec::new();
    let mut rows = Vec::new();

    for result in results {
        push_value(
            &mut scenarios,
            &result.scenario_id,
            Some(&result.scenario_name),
        );
        if result.error.is_some() {
            continue;
        }

        if result.breakdown.is_empty() {
            rows.push(DataRow {
                coordinates: BTreeMap::from([(
                    "scenario".to_string(),
                    result.scenario_id.clone(),
                )]),
                values: metric_values(
                    result.probability,
                    result.expected_costs.monetary,
                    result.expected_costs.time,
                ),
            });
            continue;
        }

        for entry in &result.breakdown {
            breakdown_kind.get_or_insert(entry.dimension);
            push_value(&mut breakdown_values, &entry.node, entry.label.as_ref());
            rows.push(DataRow {
                coordinates: BTreeMap::from([
                    ("scenario".to_string(), result.scenario_id.clone()),
                    (entry.dimension.to_string(), entry.node.clone()),
                ]),
                values: metric_values(
                    entry.probability,
                    entry.expected_costs.monetary,
                    entry.expected_costs.time,
                ),
            });
        }
    }

    let mut dimensions = vec![Dimension {
        id: "scenario".to_string(),
        values: scenarios,
    }];
    if let Some(kind) = breakdown_kind {
        dimensions.push(Dimension {
            id: kind.to_string(),
            values: breakdown_values,
        });
    }

    DimensionalData {
        dimensions,
        metrics: vec![
            Metric {
                id: "probability".to_string(),
                label: "Probability".to_string(),
                units: None,
            },
            Metric {
                id: "expected_cost_monetary".to_string(),
                label: "Expected monetary cost".to_string(),
                units: units.monetary.clone(),
            },
            Metric {
                id: "expected_cost_time".to_string(),
                label: "Expected time cost".to_string(),
                units: units.time.clone(),
            },
        ],
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisAdaptor, AnalysisOutcome};
    use crate::dsl::parse;
    use crate::error::ComputeTimeout;
    use crate::graph::testing::branching_graph;
    use crate::runner::ExpectedCosts;
    use std::time::Duration;

    fn outcome(probability: f64, breakdown: Vec<BreakdownEntry>) -> AnalysisOutcome {
        AnalysisOutcome {
            probability,
            expected_costs: ExpectedCosts::default(),
            path_nodes: vec!["A".to_string(), "C".to_string()],
            unreachable: false,
            breakdown,
            stats: TraversalStats::default(),
        }
    }

    fn branch(node: &str, probability: f64) -> BreakdownEntry {
        BreakdownEntry {
            dimension: DimensionKind::Branch,
            node: node.to_string(),
            label: None,
            probability,
            step_probability: None,
            expected_costs: ExpectedCosts::default(),
            unreachable: false,
            residual: false,
        }
    }

    fn assemble(runs: Vec<ScenarioRun>) -> AnalysisResponse {
        let graph = FunnelGraph::build(&branching_graph()).unwrap();
        let adaptor = AnalysisAdaptor::with_default_rules().unwrap();
        let query = parse("from(A).to(C)").unwrap();
        let predicates = SelectionPredicates::compute(&graph, &query.selected_nodes())
            .unwrap()
            .with_query(&query);
        let rule = adaptor.match_predicates(&predicates);
        let plan = RunPlan {
            origin: graph.node_index("A").unwrap(),
            targets: vec![graph.node_index("C").unwrap()],
        };
        ResultAssembler {
            graph: &graph,
            rule,
            query: &query,
            predicates: &predicates,
            plan: &plan,
            pruned_edges: Vec::new(),
        }
        .assemble(runs)
    }

    fn run(id: &str, outcome: Result<AnalysisOutcome, ComputeTimeout>) -> ScenarioRun {
        ScenarioRun {
            scenario_id: id.to_string(),
            name: id.to_uppercase(),
            outcome,
        }
    }

    #[test]
    fn single_scenario_has_one_row() {
        let response = assemble(vec![run("default", Ok(outcome(1.0, Vec::new())))]);
        assert_eq!(response.analysis_type, "path_between");
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.data.rows.len(), 1);
        assert_eq!(response.data.dimensions.len(), 1);
        assert_eq!(response.metadata.from, "A");
        assert_eq!(response.metadata.to.as_deref(), Some("C"));
        assert_eq!(response.data.rows[0].values["probability"], 1.0);
    }

    #[test]
    fn breakdown_adds_a_dimension() {
        let response = assemble(vec![
            run("a", Ok(outcome(1.0, vec![branch("B1", 0.3), branch("B2", 0.7)]))),
            run("b", Ok(outcome(1.0, vec![branch("B1", 0.5), branch("B2", 0.5)]))),
        ]);
        assert_eq!(response.data.rows.len(), 4);
        let branch_dimension = &response.data.dimensions[1];
        assert_eq!(branch_dimension.id, "branch");
        assert_eq!(branch_dimension.values.len(), 2);
        assert_eq!(response.data.rows[2].coordinates["scenario"], "b");
        assert_eq!(response.data.rows[2].coordinates["branch"], "B1");
    }

    #[test]
    fn timeouts_are_annotated_per_scenario() {
        let timeout = ComputeTimeout {
            steps: 11,
            elapsed: Duration::from_millis(3),
            max_steps: 10,
            max_duration: Duration::from_secs(1),
        };
        let response = assemble(vec![
            run("ok", Ok(outcome(0.4, Vec::new()))),
            run("slow", Err(timeout)),
        ]);
        assert_eq!(response.results[1].scenario_id, "slow");
        let error = response.results[1].error.as_ref().unwrap();
        assert_eq!(error.error_type, "compute_error");
        assert_eq!(response.data.rows.len(), 1);
        assert_eq!(response.data.dimensions[0].values.len(), 2);
    }
}
