//! Path probability and expected cost runner
//!
//! Walks every simple path from an origin to a target over a pruned graph,
//! resolving each edge's effective probability from scenario overrides,
//! conditional probabilities and base weights. Partial mass is memoized per
//! node when the node's continuation cannot depend on anything beyond the
//! nodes and cases its downstream conditions reference.

use crate::dsl::ContextFilter;
use crate::error::ComputeTimeout;
use crate::graph::{EdgeCost, EvalState};
use crate::overrides::ResolvedOverrides;
use crate::pruning::PrunedGraph;
use daggy::{EdgeIndex, NodeIndex};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// The wall clock is sampled once per this many steps
const CLOCK_CHECK_INTERVAL: u64 = 256;

/// Ceilings for one traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalLimits {
    pub max_steps: u64,
    pub max_duration: Duration,
}

impl TraversalLimits {
    pub fn new(max_steps: u64, max_duration: Duration) -> Self {
        TraversalLimits {
            max_steps,
            max_duration,
        }
    }
}

impl Default for TraversalLimits {
    fn default() -> Self {
        TraversalLimits {
            max_steps: 1_000_000,
            max_duration: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ExpectedCosts {
    pub monetary: f64,
    pub time: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TraversalStats {
    pub steps: u64,
    pub memo_hits: u64,
    /// Whether any node of the traversal was memoizable
    pub memoized: bool,
}

/// Outcome of one origin -> target traversal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathResult {
    pub probability: f64,
    /// Expected cost conditional on reaching the target
    pub expected_costs: ExpectedCosts,
    pub pruned_edges: Vec<String>,
    pub path_nodes: Vec<String>,
    pub unreachable: bool,
    pub stats: TraversalStats,
}

/// Probability mass with its probability-weighted costs
#[derive(Debug, Clone, Copy, Default)]
struct Mass {
    probability: f64,
    monetary: f64,
    time: f64,
}

impl Mass {
    const ARRIVED: Mass = Mass {
        probability: 1.0,
        monetary: 0.0,
        time: 0.0,
    };

    /// Adds `tail` reached over an edge with probability `p` and cost `cost`
    fn absorb(&mut self, p: f64, cost: EdgeCost, tail: Mass) {
        self.probability += p * tail.probability;
        self.monetary += p * (cost.monetary * tail.probability + tail.monetary);
        self.time += p * (cost.time * tail.probability + tail.time);
    }
}

#[derive(Debug, Clone, Copy)]
struct Step {
    edge: EdgeIndex,
    target: NodeIndex,
    probability: f64,
    cost: EdgeCost,
}

/// Which clause constraints a traversal enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConstraintScope {
    All,
    /// Only nodes that can precede the target, the target itself, or prior stages
    UpToTarget,
}

/// Required nodes and at-least-one-of groups checked on arrival
#[derive(Debug, Default)]
struct Constraints {
    required: Vec<NodeIndex>,
    required_any: Vec<Vec<NodeIndex>>,
}

impl Constraints {
    fn scoped(
        pruned: &PrunedGraph<'_>,
        scope: ConstraintScope,
        to: NodeIndex,
        backward: &HashSet<NodeIndex>,
        prior: &[NodeIndex],
    ) -> Self {
        let in_scope = |n: &NodeIndex| match scope {
            ConstraintScope::All => true,
            ConstraintScope::UpToTarget => *n == to || backward.contains(n) || prior.contains(n),
        };
        Constraints {
            required: pruned.required().iter().copied().filter(in_scope).collect(),
            required_any: pruned
                .required_any()
                .iter()
                .map(|group| group.iter().copied().filter(in_scope).collect::<Vec<_>>())
                .filter(|group| !group.is_empty())
                .collect(),
        }
    }

    fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.required
            .iter()
            .chain(self.required_any.iter().flatten())
            .copied()
    }

    /// Whether every constraint holds once `arriving` is visited
    fn satisfied(&self, visited: &HashSet<NodeIndex>, arriving: NodeIndex) -> bool {
        let seen = |n: &NodeIndex| *n == arriving || visited.contains(n);
        self.required.iter().all(|n| seen(n))
            && self.required_any.iter().all(|group| group.iter().any(|n| seen(n)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    node: NodeIndex,
    visited: Vec<NodeIndex>,
    cases: Vec<(String, String)>,
}

/// What a memoizable node's continuation depends on
#[derive(Debug, Default)]
struct MemoEntry {
    nodes: Vec<NodeIndex>,
    cases: Vec<String>,
}

#[derive(Debug, Default)]
struct MemoPlan {
    entries: HashMap<NodeIndex, MemoEntry>,
}

impl MemoPlan {
    fn build(
        pruned: &PrunedGraph<'_>,
        candidates: &HashSet<NodeIndex>,
        target: NodeIndex,
        prior: &[NodeIndex],
        constraints: &Constraints,
    ) -> Self {
        let graph = pruned.graph();
        let reach: HashMap<NodeIndex, HashSet<NodeIndex>> = candidates
            .iter()
            .map(|&n| {
                let reach = pruned
                    .reachable_from(n)
                    .into_iter()
                    .filter(|m| candidates.contains(m))
                    .collect();
                (n, reach)
            })
            .collect();

        let cyclic: HashSet<NodeIndex> = candidates
            .iter()
            .copied()
            .filter(|&n| {
                pruned.kept_out_edges(n).into_iter().any(|e| {
                    let (_, child) = graph.endpoints(e);
                    child == n || reach.get(&child).map_or(false, |r| r.contains(&n))
                })
            })
            .collect();

        let constraints: Vec<NodeIndex> = constraints.nodes().collect();

        let mut entries = HashMap::new();
        for (&node, downstream) in &reach {
            // The target ends a path and never gets a frame
            if node == target {
                continue;
            }
            if downstream
                .iter()
                .any(|m| cyclic.contains(m) || prior.contains(m))
            {
                continue;
            }
            let mut entry = MemoEntry {
                nodes: constraints.clone(),
                cases: Vec::new(),
            };
            for &m in downstream {
                for edge in pruned.kept_out_edges(m) {
                    for conditional in &graph.edge(edge).conditionals {
                        entry.nodes.extend(conditional.condition.referenced_nodes());
                        entry
                            .cases
                            .extend(conditional.condition.referenced_cases().map(str::to_string));
                    }
                }
            }
            entry.nodes.sort();
            entry.nodes.dedup();
            entry.cases.sort();
            entry.cases.dedup();
            entries.insert(node, entry);
        }

        MemoPlan { entries }
    }

    fn key(
        &self,
        node: NodeIndex,
        visited: &HashSet<NodeIndex>,
        cases: &BTreeMap<String, String>,
    ) -> Option<MemoKey> {
        let entry = self.entries.get(&node)?;
        Some(MemoKey {
            node,
            visited: entry
                .nodes
                .iter()
                .copied()
                .filter(|n| visited.contains(n))
                .collect(),
            cases: entry
                .cases
                .iter()
                .filter_map(|c| cases.get(c).map(|v| (c.clone(), v.clone())))
                .collect(),
        })
    }
}

struct Frame {
    node: NodeIndex,
    steps: Vec<Step>,
    cursor: usize,
    mass: Mass,
    memo_key: Option<MemoKey>,
    /// Whether entering this frame added `node` to the visited set
    entered: bool,
    /// Case choice to undo when the frame is popped
    case_restore: Option<(String, Option<String>)>,
    /// Edge to the child frame currently being explored
    pending: Option<Step>,
}

impl Frame {
    fn next_step(&mut self) -> Option<Step> {
        let step = self.steps.get(self.cursor).copied();
        if step.is_some() {
            self.cursor += 1;
        }
        step
    }
}

fn restore_case(cases: &mut BTreeMap<String, String>, restore: Option<(String, Option<String>)>) {
    match restore {
        Some((case_id, Some(previous))) => {
            cases.insert(case_id, previous);
        }
        Some((case_id, None)) => {
            cases.remove(&case_id);
        }
        None => {}
    }
}

/// Computes path probabilities and expected costs for one scenario
pub struct PathRunner<'a> {
    pruned: &'a PrunedGraph<'a>,
    overrides: &'a ResolvedOverrides,
    context: BTreeMap<String, String>,
    limits: TraversalLimits,
    memoize: bool,
}

impl<'a> PathRunner<'a> {
    pub fn new(
        pruned: &'a PrunedGraph<'a>,
        overrides: &'a ResolvedOverrides,
        context: &[ContextFilter],
        limits: TraversalLimits,
    ) -> Self {
        PathRunner {
            pruned,
            overrides,
            context: context
                .iter()
                .map(|c| (c.key.clone(), c.value.clone()))
                .collect(),
            limits,
            memoize: true,
        }
    }

    pub fn with_memoization(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }

    pub fn pruned(&self) -> &PrunedGraph<'a> {
        self.pruned
    }

    pub fn run(&self, from: NodeIndex, to: NodeIndex) -> Result<PathResult, ComputeTimeout> {
        self.traverse(from, to, &[], ConstraintScope::All)
    }

    /// Runs one leg of a multi-step query.
    ///
    /// `prior` counts as already visited, and only required nodes that can be
    /// visited before arriving at `to` (or are `to` itself) constrain the leg.
    /// Nodes that lie beyond `to` are left to later legs.
    pub fn run_stage(
        &self,
        from: NodeIndex,
        to: NodeIndex,
        prior: &[NodeIndex],
    ) -> Result<PathResult, ComputeTimeout> {
        self.traverse(from, to, prior, ConstraintScope::UpToTarget)
    }

    fn traverse(
        &self,
        from: NodeIndex,
        to: NodeIndex,
        prior: &[NodeIndex],
        scope: ConstraintScope,
    ) -> Result<PathResult, ComputeTimeout> {
        let graph = self.pruned.graph();
        let pruned_edges = self.pruned.pruned_edges();
        let path_nodes: Vec<String> = self
            .pruned
            .path_nodes(from, to)
            .into_iter()
            .map(|n| graph.node_id(n).to_string())
            .collect();

        let backward = self.pruned.reaching(to);
        let constraints = Constraints::scoped(self.pruned, scope, to, &backward, prior);

        let mut visited: HashSet<NodeIndex> = prior.iter().copied().collect();
        let root_entered = visited.insert(from);

        if from == to {
            let probability = if constraints.satisfied(&visited, to) {
                1.0
            } else {
                0.0
            };
            return Ok(self.finish(
                Mass {
                    probability,
                    ..Mass::default()
                },
                pruned_edges,
                path_nodes,
                TraversalStats::default(),
            ));
        }

        let forward = self.pruned.reachable_from(from);
        if !forward.contains(&to) {
            trace!(
                from = graph.node_id(from),
                to = graph.node_id(to),
                "Target structurally unreachable"
            );
            return Ok(self.finish(Mass::default(), pruned_edges, path_nodes, TraversalStats::default()));
        }
        let candidates: HashSet<NodeIndex> = forward.intersection(&backward).copied().collect();

        let plan = if self.memoize {
            MemoPlan::build(self.pruned, &candidates, to, prior, &constraints)
        } else {
            MemoPlan::default()
        };

        let started = Instant::now();
        let mut stats = TraversalStats {
            memoized: !plan.entries.is_empty(),
            ..TraversalStats::default()
        };
        let mut memo: HashMap<MemoKey, Mass> = HashMap::new();
        let mut cases = self.overrides.cases.clone();
        let mut total = Mass::default();

        let mut stack = vec![Frame {
            node: from,
            steps: self.steps(from, &visited, &cases),
            cursor: 0,
            mass: Mass::default(),
            memo_key: None,
            entered: root_entered,
            case_restore: None,
            pending: None,
        }];

        while let Some(top) = stack.last_mut() {
            stats.steps += 1;
            if stats.steps > self.limits.max_steps
                || (stats.steps % CLOCK_CHECK_INTERVAL == 0
                    && started.elapsed() > self.limits.max_duration)
            {
                return Err(ComputeTimeout {
                    steps: stats.steps,
                    elapsed: started.elapsed(),
                    max_steps: self.limits.max_steps,
                    max_duration: self.limits.max_duration,
                });
            }

            match top.next_step() {
                Some(step) => {
                    if step.probability <= 0.0 {
                        continue;
                    }
                    if step.target == to {
                        if constraints.satisfied(&visited, to) {
                            top.mass.absorb(step.probability, step.cost, Mass::ARRIVED);
                        }
                        continue;
                    }
                    if !candidates.contains(&step.target) || visited.contains(&step.target) {
                        continue;
                    }

                    let case_restore = graph
                        .edge(step.edge)
                        .case
                        .as_ref()
                        .filter(|binding| !self.overrides.cases.contains_key(&binding.case_id))
                        .map(|binding| {
                            let previous =
                                cases.insert(binding.case_id.clone(), binding.variant.clone());
                            (binding.case_id.clone(), previous)
                        });
                    visited.insert(step.target);

                    let memo_key = plan.key(step.target, &visited, &cases);
                    if let Some(tail) = memo_key.as_ref().and_then(|key| memo.get(key)) {
                        top.mass.absorb(step.probability, step.cost, *tail);
                        stats.memo_hits += 1;
                        visited.remove(&step.target);
                        restore_case(&mut cases, case_restore);
                        continue;
                    }

                    top.pending = Some(step);
                    let steps = self.steps(step.target, &visited, &cases);
                    stack.push(Frame {
                        node: step.target,
                        steps,
                        cursor: 0,
                        mass: Mass::default(),
                        memo_key,
                        entered: true,
                        case_restore,
                        pending: None,
                    });
                }
                None => {
                    let Some(done) = stack.pop() else { break };
                    if let Some(key) = done.memo_key {
                        memo.insert(key, done.mass);
                    }
                    if done.entered {
                        visited.remove(&done.node);
                    }
                    restore_case(&mut cases, done.case_restore);
                    match stack.last_mut() {
                        Some(parent) => {
                            if let Some(step) = parent.pending.take() {
                                parent.mass.absorb(step.probability, step.cost, done.mass);
                            }
                        }
                        None => total = done.mass,
                    }
                }
            }
        }

        debug!(
            from = graph.node_id(from),
            to = graph.node_id(to),
            probability = total.probability,
            steps = stats.steps,
            memo_hits = stats.memo_hits,
            "Path traversal complete"
        );

        Ok(self.finish(total, pruned_edges, path_nodes, stats))
    }

    fn finish(
        &self,
        mass: Mass,
        pruned_edges: Vec<String>,
        path_nodes: Vec<String>,
        stats: TraversalStats,
    ) -> PathResult {
        let probability = mass.probability.clamp(0.0, 1.0);
        let expected_costs = if mass.probability > 0.0 {
            ExpectedCosts {
                monetary: mass.monetary / mass.probability,
                time: mass.time / mass.probability,
            }
        } else {
            ExpectedCosts::default()
        };
        PathResult {
            probability,
            expected_costs,
            pruned_edges,
            path_nodes,
            unreachable: probability <= 0.0,
            stats,
        }
    }

    /// Outgoing steps of `node` with effective probabilities
    fn steps(
        &self,
        node: NodeIndex,
        visited: &HashSet<NodeIndex>,
        cases: &BTreeMap<String, String>,
    ) -> Vec<Step> {
        let graph = self.pruned.graph();
        let state = EvalState {
            visited,
            context: &self.context,
            cases,
        };
        let mut steps: Vec<Step> = self
            .pruned
            .kept_out_edges(node)
            .into_iter()
            .map(|edge| {
                let (_, target) = graph.endpoints(edge);
                Step {
                    edge,
                    target,
                    probability: self.effective_probability(edge, &state),
                    cost: graph.edge(edge).cost,
                }
            })
            .collect();

        if self.pruned.is_touched(node) {
            let total: f64 = steps.iter().map(|s| s.probability).sum();
            if total > 0.0 {
                for step in &mut steps {
                    step.probability /= total;
                }
            }
        }
        steps
    }

    /// Override, then case override, then first active conditional, then base.
    fn effective_probability(&self, edge: EdgeIndex, state: &EvalState<'_>) -> f64 {
        if let Some(&probability) = self.overrides.probabilities.get(&edge) {
            return probability;
        }
        let data = self.pruned.graph().edge(edge);
        if let Some(binding) = &data.case {
            if let Some(variant) = self.overrides.cases.get(&binding.case_id) {
                return if *variant == binding.variant { 1.0 } else { 0.0 };
            }
        }
        for conditional in &data.conditionals {
            let active = match self.overrides.conditionals.get(&conditional.condition.key) {
                Some(&forced) => forced,
                None => conditional.condition.is_satisfied(state),
            };
            if active {
                return conditional.probability;
            }
        }
        data.probability
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::{branching_graph, chain, edge, entry, node};
    use crate::graph::types::{ConditionalProbabilityJson, CostParam, GraphJson, ProbabilityParam};
    use crate::graph::FunnelGraph;
    use crate::pruning::prune;

    fn run(graph: &FunnelGraph, pruned: &PrunedGraph<'_>, from: &str, to: &str) -> PathResult {
        let overrides = ResolvedOverrides::default();
        PathRunner::new(pruned, &overrides, &[], TraversalLimits::default())
            .run(graph.node_index(from).unwrap(), graph.node_index(to).unwrap())
            .unwrap()
    }

    /// `n0 -> {a_i, b_i} -> n{i+1}` repeated `count` times
    fn diamond_ladder(count: usize) -> GraphJson {
        let mut json = GraphJson {
            nodes: vec![entry("n0")],
            ..GraphJson::default()
        };
        for i in 0..count {
            let (a, b, next) = (format!("a{}", i), format!("b{}", i), format!("n{}", i + 1));
            json.nodes.extend([node(&a), node(&b), node(&next)]);
            json.edges.push(edge(&format!("n{}", i), &a, Some(0.6)));
            json.edges.push(edge(&format!("n{}", i), &b, Some(0.3)));
            json.edges.push(edge(&a, &next, Some(0.9)));
            json.edges.push(edge(&b, &next, Some(0.5)));
        }
        json
    }

    #[test]
    fn chain_probability_is_product() {
        let graph = FunnelGraph::build(&chain(&[0.5, 0.4, 0.9])).unwrap();
        let pruned = PrunedGraph::unpruned(&graph);
        let result = run(&graph, &pruned, "n0", "n3");
        assert!((result.probability - 0.18).abs() < 1e-12);
        assert!(!result.unreachable);
        assert_eq!(result.path_nodes, vec!["n0", "n1", "n2", "n3"]);
    }

    #[test]
    fn stage_ignores_required_nodes_past_its_target() {
        let graph = FunnelGraph::build(&chain(&[0.5, 0.4, 0.5])).unwrap();
        let pruned = prune(&graph, &["n3".to_string()], &[], &[]).unwrap();
        let overrides = ResolvedOverrides::default();
        let runner = PathRunner::new(&pruned, &overrides, &[], TraversalLimits::default());
        let (n0, n1, n3) = (
            graph.node_index("n0").unwrap(),
            graph.node_index("n1").unwrap(),
            graph.node_index("n3").unwrap(),
        );

        // A whole path to n1 can never have visited n3
        assert!(runner.run(n0, n1).unwrap().unreachable);

        let leg = runner.run_stage(n0, n1, &[]).unwrap();
        assert!((leg.probability - 0.5).abs() < 1e-12);
        let last = runner.run_stage(n1, n3, &[n0]).unwrap();
        assert!((last.probability - 0.4).abs() < 1e-12);
    }

    #[test]
    fn visited_branch_reaches_with_certainty() {
        let graph = FunnelGraph::build(&branching_graph()).unwrap();
        let pruned = prune(&graph, &["B1".to_string()], &[], &[]).unwrap();
        let result = run(&graph, &pruned, "A", "C");
        assert!((result.probability - 1.0).abs() < 1e-12);
        assert_eq!(result.pruned_edges, vec!["A->B2", "A->B3"]);
    }

    #[test]
    fn unreachable_target_is_not_an_error() {
        let mut json = branching_graph();
        json.nodes.push(node("Z"));
        let graph = FunnelGraph::build(&json).unwrap();
        let pruned = PrunedGraph::unpruned(&graph);
        let result = run(&graph, &pruned, "A", "Z");
        assert_eq!(result.probability, 0.0);
        assert!(result.unreachable);
        assert!(result.path_nodes.is_empty());
    }

    #[test]
    fn expected_costs_are_conditional_on_arrival() {
        let mut json = branching_graph();
        json.edges[0].cost_monetary = Some(CostParam {
            mean: 10.0,
            ..CostParam::default()
        });
        json.edges[1].cost_time = Some(CostParam {
            mean: 4.0,
            ..CostParam::default()
        });
        let graph = FunnelGraph::build(&json).unwrap();
        let pruned = PrunedGraph::unpruned(&graph);
        let result = run(&graph, &pruned, "A", "C");
        assert!((result.probability - 1.0).abs() < 1e-12);
        assert!((result.expected_costs.monetary - 3.0).abs() < 1e-12);
        assert!((result.expected_costs.time - 2.0).abs() < 1e-12);
    }

    #[test]
    fn conditional_probability_follows_history() {
        let mut json = branching_graph();
        json.nodes.push(node("D"));
        json.edges[3].p = Some(ProbabilityParam::new(0.5));
        json.edges[4].p = Some(ProbabilityParam::new(0.5));
        json.edges[5].p = Some(ProbabilityParam::new(0.5));
        let mut to_d = edge("C", "D", Some(0.1));
        to_d.conditional_p.push(ConditionalProbabilityJson {
            condition: "visited(B1)".to_string(),
            p: ProbabilityParam::new(0.9),
        });
        json.edges.push(to_d);
        let graph = FunnelGraph::build(&json).unwrap();
        let pruned = PrunedGraph::unpruned(&graph);

        // 0.3 * 0.5 * 0.9 + 0.7 * 0.5 * 0.1
        let expected = 0.135 + 0.035;
        let result = run(&graph, &pruned, "A", "D");
        assert!((result.probability - expected).abs() < 1e-12);

        let key = graph.parse_condition("visited(B1)").unwrap().key;
        let overrides = ResolvedOverrides {
            conditionals: [(key, false)].into_iter().collect(),
            ..ResolvedOverrides::default()
        };
        let forced_off = PathRunner::new(&pruned, &overrides, &[], TraversalLimits::default())
            .run(graph.node_index("A").unwrap(), graph.node_index("D").unwrap())
            .unwrap();
        assert!((forced_off.probability - 0.05).abs() < 1e-12);
    }

    #[test]
    fn memoization_matches_exhaustive_walk() {
        let graph = FunnelGraph::build(&diamond_ladder(8)).unwrap();
        let pruned = PrunedGraph::unpruned(&graph);
        let overrides = ResolvedOverrides::default();
        let (from, to) = (graph.node_index("n0").unwrap(), graph.node_index("n8").unwrap());

        let memoized = PathRunner::new(&pruned, &overrides, &[], TraversalLimits::default())
            .run(from, to)
            .unwrap();
        let exhaustive = PathRunner::new(&pruned, &overrides, &[], TraversalLimits::default())
            .with_memoization(false)
            .run(from, to)
            .unwrap();

        let expected = (0.6f64 * 0.9 + 0.3 * 0.5).powi(8);
        assert!((memoized.probability - expected).abs() < 1e-12);
        assert!((exhaustive.probability - expected).abs() < 1e-12);
        assert!(memoized.stats.memo_hits > 0);
        assert!(memoized.stats.steps < exhaustive.stats.steps);
    }

    #[test]
    fn cycles_are_walked_without_reentry() {
        let mut json = chain(&[1.0, 0.5]);
        json.edges.push(edge("n1", "n0", Some(0.5)));
        let graph = FunnelGraph::build(&json).unwrap();
        let pruned = PrunedGraph::unpruned(&graph);
        let result = run(&graph, &pruned, "n0", "n2");
        assert!((result.probability - 0.5).abs() < 1e-12);
        assert!(!result.stats.memoized);
    }

    #[test]
    fn step_ceiling_yields_timeout() {
        let graph = FunnelGraph::build(&diamond_ladder(20)).unwrap();
        let pruned = PrunedGraph::unpruned(&graph);
        let overrides = ResolvedOverrides::default();
        let limits = TraversalLimits::new(50, Duration::from_secs(5));
        let err = PathRunner::new(&pruned, &overrides, &[], limits)
            .run(graph.node_index("n0").unwrap(), graph.node_index("n20").unwrap())
            .unwrap_err();
        assert_eq!(err.max_steps, 50);
        assert!(err.steps > 50);
    }

    #[test]
    fn probability_override_is_renormalized_at_touched_points() {
        let graph = FunnelGraph::build(&branching_graph()).unwrap();
        let pruned = prune(&graph, &[], &[vec!["B1".to_string(), "B2".to_string()]], &[]).unwrap();
        let b1 = graph.edge_index("A->B1").unwrap();
        let overrides = ResolvedOverrides {
            probabilities: [(b1, 0.5)].into_iter().collect(),
            ..ResolvedOverrides::default()
        };
        let (a, b1_node) = (graph.node_index("A").unwrap(), graph.node_index("B1").unwrap());
        let result = PathRunner::new(&pruned, &overrides, &[], TraversalLimits::default())
            .run(a, b1_node)
            .unwrap();
        assert!((result.probability - 0.5).abs() < 1e-12);
    }
}
