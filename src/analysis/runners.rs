//! Analysis runners
//!
//! Each runner resolves the origin and targets of its analysis once per
//! request (`plan`) and then evaluates them per scenario (`execute`) on top
//! of the path runner.

use crate::analysis::rules::RunnerKind;
use crate::dsl::ParsedQuery;
use crate::error::{AnalysisError, ComputeTimeout, ConfigError};
use crate::graph::FunnelGraph;
use crate::predicates::SelectionPredicates;
use crate::runner::{ExpectedCosts, PathResult, PathRunner, TraversalStats};
use daggy::NodeIndex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Breakdown dimension of a multi-target analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    Stage,
    Outcome,
    Branch,
    Node,
}

impl DimensionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionKind::Stage => "stage",
            DimensionKind::Outcome => "outcome",
            DimensionKind::Branch => "branch",
            DimensionKind::Node => "node",
        }
    }
}

impl fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownEntry {
    pub dimension: DimensionKind,
    pub node: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub probability: f64,
    /// Conversion from the previous stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_probability: Option<f64>,
    pub expected_costs: ExpectedCosts,
    pub unreachable: bool,
    /// Mass not reaching any selected outcome
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub residual: bool,
}

/// Result of running one analysis for one scenario
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutcome {
    pub probability: f64,
    pub expected_costs: ExpectedCosts,
    pub path_nodes: Vec<String>,
    pub unreachable: bool,
    pub breakdown: Vec<BreakdownEntry>,
    pub stats: TraversalStats,
}

impl AnalysisOutcome {
    fn from_path(result: PathResult) -> Self {
        AnalysisOutcome {
            probability: result.probability,
            expected_costs: result.expected_costs,
            path_nodes: result.path_nodes,
            unreachable: result.unreachable,
            breakdown: Vec::new(),
            stats: result.stats,
        }
    }
}

/// Inputs available when planning an analysis
pub struct PlanContext<'a> {
    pub graph: &'a FunnelGraph,
    pub query: &'a ParsedQuery,
    pub predicates: &'a SelectionPredicates,
    /// Selected nodes in selection order
    pub selection: &'a [NodeIndex],
}

/// Origin and targets resolved for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub origin: NodeIndex,
    pub targets: Vec<NodeIndex>,
}

/// An analysis built on the path runner
pub trait AnalysisRunner: Send + Sync {
    fn kind(&self) -> RunnerKind;

    /// Resolves origin and targets.
    ///
    /// # Errors
    /// `Validation` when the selection does not determine them.
    fn plan(&self, ctx: &PlanContext<'_>) -> Result<RunPlan, AnalysisError>;

    fn execute(
        &self,
        plan: &RunPlan,
        runner: &PathRunner<'_>,
    ) -> Result<AnalysisOutcome, ComputeTimeout>;
}

/// Built-in runners keyed by kind
pub struct RunnerRegistry {
    runners: HashMap<RunnerKind, Box<dyn AnalysisRunner>>,
}

impl fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&RunnerKind> = self.runners.keys().collect();
        kinds.sort();
        f.debug_struct("RunnerRegistry").field("runners", &kinds).finish()
    }
}

impl RunnerRegistry {
    pub fn new() -> Self {
        let mut runners: HashMap<RunnerKind, Box<dyn AnalysisRunner>> = HashMap::new();
        runners.insert(RunnerKind::Path, Box::new(PathAnalysis));
        runners.insert(RunnerKind::ReachProbability, Box::new(ReachProbability));
        runners.insert(RunnerKind::ConversionFunnel, Box::new(ConversionFunnel));
        runners.insert(RunnerKind::OutcomeComparison, Box::new(OutcomeComparison));
        runners.insert(RunnerKind::BranchComparison, Box::new(BranchComparison));
        runners.insert(RunnerKind::GeneralSelection, Box::new(GeneralSelection));
        RunnerRegistry { runners }
    }

    pub fn runner(&self, kind: RunnerKind) -> Result<&dyn AnalysisRunner, ConfigError> {
        self.runners
            .get(&kind)
            .map(|boxed| boxed.as_ref())
            .ok_or_else(|| ConfigError::Invalid(format!("no runner registered for '{}'", kind)))
    }
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validation(msg: impl Into<String>) -> AnalysisError {
    AnalysisError::Validation(msg.into())
}

/// `from`, or the graph's only entry node
fn origin(ctx: &PlanContext<'_>) -> Result<NodeIndex, AnalysisError> {
    if let Some(from) = &ctx.query.from {
        return ctx.graph.require_node(from);
    }
    match ctx.graph.entry_nodes().as_slice() {
        [only] => Ok(*only),
        [] => Err(validation(
            "Cannot determine an origin: the graph has no entry node; add from(...)",
        )),
        many => Err(validation(format!(
            "Cannot determine an origin: the graph has {} entry nodes; add from(...)",
            many.len()
        ))),
    }
}

/// Selection without the origin, or just the origin if nothing else is left
fn targets_excluding(origin: NodeIndex, nodes: &[NodeIndex]) -> Vec<NodeIndex> {
    let targets: Vec<NodeIndex> = nodes.iter().copied().filter(|&n| n != origin).collect();
    if targets.is_empty() {
        vec![origin]
    } else {
        targets
    }
}

fn entry(
    graph: &FunnelGraph,
    dimension: DimensionKind,
    node: NodeIndex,
    result: &PathResult,
) -> BreakdownEntry {
    let data = graph.node(node);
    BreakdownEntry {
        dimension,
        node: data.id.clone(),
        label: data.label.clone(),
        probability: result.probability,
        step_probability: None,
        expected_costs: result.expected_costs,
        unreachable: result.unreachable,
        residual: false,
    }
}

fn merge_path_nodes(into: &mut Vec<String>, nodes: &[String]) {
    for node in nodes {
        if !into.contains(node) {
            into.push(node.clone());
        }
    }
}

fn merge_stats(into: &mut TraversalStats, stats: &TraversalStats) {
    into.steps += stats.steps;
    into.memo_hits += stats.memo_hits;
    into.memoized |= stats.memoized;
}

/// Expected costs weighted by each target's reach probability
fn weighted_costs(results: &[PathResult]) -> ExpectedCosts {
    let total: f64 = results.iter().map(|r| r.probability).sum();
    if total <= 0.0 {
        return ExpectedCosts::default();
    }
    ExpectedCosts {
        monetary: results
            .iter()
            .map(|r| r.probability * r.expected_costs.monetary)
            .sum::<f64>()
            / total,
        time: results
            .iter()
            .map(|r| r.probability * r.expected_costs.time)
            .sum::<f64>()
            / total,
    }
}

/// Runs origin -> each target and builds the per-target breakdown
fn run_targets(
    plan: &RunPlan,
    runner: &PathRunner<'_>,
    dimension: DimensionKind,
) -> Result<(Vec<PathResult>, AnalysisOutcome), ComputeTimeout> {
    let graph = runner.pruned().graph();
    let mut results = Vec::with_capacity(plan.targets.len());
    let mut outcome = AnalysisOutcome {
        probability: 0.0,
        expected_costs: ExpectedCosts::default(),
        path_nodes: Vec::new(),
        unreachable: true,
        breakdown: Vec::with_capacity(plan.targets.len()),
        stats: TraversalStats::default(),
    };
    for &target in &plan.targets {
        let result = runner.run_stage(plan.origin, target, &[])?;
        outcome.breakdown.push(entry(graph, dimension, target, &result));
        merge_path_nodes(&mut outcome.path_nodes, &result.path_nodes);
        merge_stats(&mut outcome.stats, &result.stats);
        outcome.unreachable &= result.unreachable;
        results.push(result);
    }
    outcome.expected_costs = weighted_costs(&results);
    Ok((results, outcome))
}

/// P(start -> end)
struct PathAnalysis;

impl AnalysisRunner for PathAnalysis {
    fn kind(&self) -> RunnerKind {
        RunnerKind::Path
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<RunPlan, AnalysisError> {
        let start = ctx
            .query
            .from
            .as_ref()
            .or(ctx.predicates.start_node.as_ref())
            .ok_or_else(|| validation("Path analysis needs from(...) or a unique start node"))?;
        let end = ctx
            .query
            .to
            .as_ref()
            .or(ctx.predicates.end_node.as_ref())
            .ok_or_else(|| validation("Path analysis needs to(...) or a unique end node"))?;
        Ok(RunPlan {
            origin: ctx.graph.require_node(start)?,
            targets: vec![ctx.graph.require_node(end)?],
        })
    }

    fn execute(
        &self,
        plan: &RunPlan,
        runner: &PathRunner<'_>,
    ) -> Result<AnalysisOutcome, ComputeTimeout> {
        let target = plan.targets.first().copied().unwrap_or(plan.origin);
        Ok(AnalysisOutcome::from_path(runner.run(plan.origin, target)?))
    }
}

/// P(origin -> node) for a single node
struct ReachProbability;

impl AnalysisRunner for ReachProbability {
    fn kind(&self) -> RunnerKind {
        RunnerKind::ReachProbability
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<RunPlan, AnalysisError> {
        let target = *ctx
            .selection
            .first()
            .ok_or_else(|| validation("Reach probability needs a selected node"))?;
        let from = ctx
            .query
            .from
            .as_ref()
            .and_then(|from| ctx.graph.node_index(from))
            .filter(|&from| from != target);
        let origin = match from {
            Some(from) => from,
            None => origin(&PlanContext {
                query: &ParsedQuery::default(),
                ..*ctx
            })?,
        };
        Ok(RunPlan {
            origin,
            targets: vec![target],
        })
    }

    fn execute(
        &self,
        plan: &RunPlan,
        runner: &PathRunner<'_>,
    ) -> Result<AnalysisOutcome, ComputeTimeout> {
        PathAnalysis.execute(plan, runner)
    }
}

/// Cumulative conversion through sequential stages
struct ConversionFunnel;

impl AnalysisRunner for ConversionFunnel {
    fn kind(&self) -> RunnerKind {
        RunnerKind::ConversionFunnel
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<RunPlan, AnalysisError> {
        let stages = ctx
            .predicates
            .sequence
            .iter()
            .map(|id| ctx.graph.require_node(id))
            .collect::<Result<Vec<_>, _>>()?;
        match stages.split_first() {
            Some((&first, rest)) if !rest.is_empty() => Ok(RunPlan {
                origin: first,
                targets: rest.to_vec(),
            }),
            _ => Err(validation(
                "Conversion funnel needs at least two sequential stages",
            )),
        }
    }

    fn execute(
        &self,
        plan: &RunPlan,
        runner: &PathRunner<'_>,
    ) -> Result<AnalysisOutcome, ComputeTimeout> {
        let graph = runner.pruned().graph();
        let mut stages = Vec::with_capacity(plan.targets.len() + 1);
        stages.push(plan.origin);
        stages.extend(plan.targets.iter().copied());

        let first = graph.node(plan.origin);
        let mut outcome = AnalysisOutcome {
            probability: 1.0,
            expected_costs: ExpectedCosts::default(),
            path_nodes: vec![first.id.clone()],
            unreachable: false,
            breakdown: vec![BreakdownEntry {
                dimension: DimensionKind::Stage,
                node: first.id.clone(),
                label: first.label.clone(),
                probability: 1.0,
                step_probability: None,
                expected_costs: ExpectedCosts::default(),
                unreachable: false,
                residual: false,
            }],
            stats: TraversalStats::default(),
        };

        for i in 1..stages.len() {
            let step = runner.run_stage(stages[i - 1], stages[i], &stages[..i])?;
            outcome.probability *= step.probability;
            outcome.expected_costs.monetary += step.expected_costs.monetary;
            outcome.expected_costs.time += step.expected_costs.time;
            merge_path_nodes(&mut outcome.path_nodes, &step.path_nodes);
            merge_stats(&mut outcome.stats, &step.stats);

            let mut stage = entry(graph, DimensionKind::Stage, stages[i], &step);
            stage.probability = outcome.probability;
            stage.step_probability = Some(step.probability);
            stage.expected_costs = outcome.expected_costs;
            stage.unreachable = outcome.probability <= 0.0;
            outcome.breakdown.push(stage);
        }
        outcome.unreachable = outcome.probability <= 0.0;
        Ok(outcome)
    }
}

/// Reach probability of each selected outcome; headline is their sum
struct OutcomeComparison;

impl AnalysisRunner for OutcomeComparison {
    fn kind(&self) -> RunnerKind {
        RunnerKind::OutcomeComparison
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<RunPlan, AnalysisError> {
        let origin = origin(ctx)?;
        let targets = if ctx.query.compare.is_empty() {
            targets_excluding(origin, ctx.selection)
        } else {
            let compared = ctx
                .query
                .compare
                .iter()
                .map(|id| ctx.graph.require_node(id))
                .collect::<Result<Vec<_>, _>>()?;
            targets_excluding(origin, &compared)
        };
        Ok(RunPlan { origin, targets })
    }

    fn execute(
        &self,
        plan: &RunPlan,
        runner: &PathRunner<'_>,
    ) -> Result<AnalysisOutcome, ComputeTimeout> {
        let graph = runner.pruned().graph();
        let (results, mut outcome) = run_targets(plan, runner, DimensionKind::Outcome)?;
        let total: f64 = results.iter().map(|r| r.probability).sum();
        outcome.probability = total.min(1.0);

        if let Some(default_outcome) = graph.policies().default_outcome {
            if !plan.targets.contains(&default_outcome) {
                let data = graph.node(default_outcome);
                let residual = (1.0 - total).max(0.0);
                outcome.breakdown.push(BreakdownEntry {
                    dimension: DimensionKind::Outcome,
                    node: data.id.clone(),
                    label: data.label.clone(),
                    probability: residual,
                    step_probability: None,
                    expected_costs: ExpectedCosts::default(),
                    unreachable: residual <= 0.0,
                    residual: true,
                });
            }
        }
        Ok(outcome)
    }
}

/// Share of traffic down each branch of one sibling group
struct BranchComparison;

impl AnalysisRunner for BranchComparison {
    fn kind(&self) -> RunnerKind {
        RunnerKind::BranchComparison
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<RunPlan, AnalysisError> {
        let group = ctx
            .predicates
            .sibling_groups
            .iter()
            .find(|group| group.members.len() == ctx.predicates.node_count)
            .ok_or_else(|| {
                validation("Branch comparison needs one sibling group covering the selection")
            })?;
        Ok(RunPlan {
            origin: ctx.graph.require_node(&group.parent)?,
            targets: group
                .members
                .iter()
                .map(|id| ctx.graph.require_node(id))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn execute(
        &self,
        plan: &RunPlan,
        runner: &PathRunner<'_>,
    ) -> Result<AnalysisOutcome, ComputeTimeout> {
        let (results, mut outcome) = run_targets(plan, runner, DimensionKind::Branch)?;
        outcome.probability = results.iter().map(|r| r.probability).sum::<f64>().min(1.0);
        Ok(outcome)
    }
}

/// Reach probability of every selected node; headline is the lowest
struct GeneralSelection;

impl AnalysisRunner for GeneralSelection {
    fn kind(&self) -> RunnerKind {
        RunnerKind::GeneralSelection
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<RunPlan, AnalysisError> {
        let origin = origin(ctx)?;
        Ok(RunPlan {
            origin,
            targets: targets_excluding(origin, ctx.selection),
        })
    }

    fn execute(
        &self,
        plan: &RunPlan,
        runner: &PathRunner<'_>,
    ) -> Result<AnalysisOutcome, ComputeTimeout> {
        let (results, mut outcome) = run_targets(plan, runner, DimensionKind::Node)?;
        outcome.probability = results
            .iter()
            .map(|r| r.probability)
            .fold(f64::INFINITY, f64::min)
            .min(1.0)
            .max(0.0);
        Ok(outcome)
    }
}
