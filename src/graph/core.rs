//! Funnel graph model
//!
//! Wraps a petgraph directed graph (re-exported by daggy) with identity
//! lookups for node/edge uuids and human ids, resolved base probabilities,
//! case-variant bindings and evaluable conditional probabilities.

use crate::error::AnalysisError;
use crate::graph::condition::Condition;
use crate::graph::types::{
    CostParam, FreeEdgePolicy, GraphJson, NodeJson, OverflowPolicy, ProbabilityParam,
};
use daggy::petgraph::graph::DiGraph;
use daggy::petgraph::visit::EdgeRef;
use daggy::petgraph::Direction;
use daggy::{EdgeIndex, NodeIndex};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Tolerance used for probability sums
pub const PROBABILITY_EPSILON: f64 = 1e-9;
const CASE_WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseVariant {
    pub name: String,
    pub weight: f64,
}

/// Case node definition: a set of weighted variants
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseDefinition {
    pub case_id: String,
    pub variants: Vec<CaseVariant>,
}

impl CaseDefinition {
    pub fn weight(&self, variant: &str) -> Option<f64> {
        self.variants
            .iter()
            .find(|v| v.name == variant)
            .map(|v| v.weight)
    }
}

/// Node in the funnel graph
#[derive(Debug, Clone, PartialEq)]
pub struct FunnelNode {
    pub uuid: String,
    pub id: String,
    pub label: Option<String>,
    pub is_entry: bool,
    pub entry_weight: f64,
    pub is_absorbing: bool,
    pub outcome_type: Option<String>,
    pub case: Option<CaseDefinition>,
}

/// Edge bound to a case variant
#[derive(Debug, Clone, PartialEq)]
pub struct CaseBinding {
    pub case_id: String,
    pub variant: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalProbability {
    pub condition: Condition,
    pub probability: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EdgeCost {
    pub monetary: f64,
    pub time: f64,
}

/// Edge in the funnel graph
#[derive(Debug, Clone, PartialEq)]
pub struct FunnelEdge {
    pub uuid: String,
    pub id: String,
    /// Base probability after case, free-edge and overflow resolution
    pub probability: f64,
    pub stdev: Option<f64>,
    pub distribution: Option<String>,
    /// Evaluated in order, first satisfied entry wins
    pub conditionals: Vec<ConditionalProbability>,
    pub cost: EdgeCost,
    pub case: Option<CaseBinding>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Policies {
    pub default_outcome: Option<NodeIndex>,
    pub overflow_policy: OverflowPolicy,
    pub free_edge_policy: FreeEdgePolicy,
}

/// Units reported alongside expected costs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostUnits {
    pub monetary: Option<String>,
    pub time: Option<String>,
}

/// Immutable, fully-resolved graph snapshot for one request
#[derive(Debug, Clone)]
pub struct FunnelGraph {
    graph: DiGraph<FunnelNode, FunnelEdge>,
    /// uuid and id -> node
    node_lookup: HashMap<String, NodeIndex>,
    /// uuid and id -> edge
    edge_lookup: HashMap<String, EdgeIndex>,
    /// case id -> case node
    case_nodes: HashMap<String, NodeIndex>,
    policies: Policies,
    cost_units: CostUnits,
}

fn schema(msg: impl Into<String>) -> AnalysisError {
    AnalysisError::Schema(msg.into())
}

fn validation(msg: impl Into<String>) -> AnalysisError {
    AnalysisError::Validation(msg.into())
}

fn check_probability(value: f64, what: impl FnOnce() -> String) -> Result<f64, AnalysisError> {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        return Err(validation(format!(
            "{} must be within [0, 1], got {}",
            what(),
            value
        )));
    }
    Ok(value)
}

fn check_cost(cost: &Option<CostParam>, edge: &str, unit: &str) -> Result<f64, AnalysisError> {
    match cost {
        Some(param) if param.mean < 0.0 || param.mean.is_nan() => Err(validation(format!(
            "Edge '{}' has negative {} cost {}",
            edge, unit, param.mean
        ))),
        Some(param) => Ok(param.mean),
        None => Ok(0.0),
    }
}

fn identity(uuid: &Option<String>, id: &Option<String>) -> Option<(String, String)> {
    match (uuid, id) {
        (Some(uuid), Some(id)) => Some((uuid.clone(), id.clone())),
        (Some(uuid), None) => Some((uuid.clone(), uuid.clone())),
        (None, Some(id)) => Some((id.clone(), id.clone())),
        (None, None) => None,
    }
}

impl FunnelGraph {
    /// Builds and validates a graph from its JSON snapshot.
    ///
    /// # Errors
    /// `Schema` on duplicate identities, dangling endpoints, absorbing nodes
    /// with outgoing edges, unknown cases/variants or malformed conditions;
    /// `Validation` on probabilities, weights or costs out of range.
    pub fn build(json: &GraphJson) -> Result<Self, AnalysisError> {
        let mut graph = FunnelGraph {
            graph: DiGraph::new(),
            node_lookup: HashMap::new(),
            edge_lookup: HashMap::new(),
            case_nodes: HashMap::new(),
            policies: Policies {
                default_outcome: None,
                overflow_policy: json.policies.overflow_policy,
                free_edge_policy: json.policies.free_edge_policy,
            },
            cost_units: CostUnits::default(),
        };

        for (position, node) in json.nodes.iter().enumerate() {
            graph.insert_node(position, node)?;
        }

        // Explicit probabilities per edge; None marks a free edge
        let mut explicit: HashMap<EdgeIndex, Option<f64>> = HashMap::new();
        for (position, edge) in json.edges.iter().enumerate() {
            let (index, probability) = graph.insert_edge(position, edge)?;
            explicit.insert(index, probability);
        }

        for node in graph.graph.node_indices() {
            let weight = &graph.graph[node];
            if weight.is_absorbing && graph.graph.edges(node).next().is_some() {
                return Err(schema(format!(
                    "Absorbing node '{}' has outgoing edges",
                    weight.id
                )));
            }
        }

        let branch_points: Vec<NodeIndex> = graph.graph.node_indices().collect();
        for node in branch_points {
            graph.resolve_branch_point(node, &explicit)?;
        }

        if let Some(outcome) = &json.policies.default_outcome {
            let index = graph
                .node_index(outcome)
                .ok_or_else(|| schema(format!("Default outcome '{}' not found", outcome)))?;
            if !graph.graph[index].is_absorbing {
                return Err(schema(format!(
                    "Default outcome '{}' is not an absorbing node",
                    outcome
                )));
            }
            graph.policies.default_outcome = Some(index);
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            cases = graph.case_nodes.len(),
            "Built funnel graph"
        );

        Ok(graph)
    }

    fn register_identity(
        lookup: &mut HashMap<String, NodeIndex>,
        kind: &str,
        uuid: &str,
        id: &str,
        index: NodeIndex,
    ) -> Result<(), AnalysisError> {
        for key in [uuid, id] {
            match lookup.get(key) {
                Some(existing) if *existing != index => {
                    return Err(schema(format!("Duplicate {} identifier '{}'", kind, key)))
                }
                _ => {
                    lookup.insert(key.to_string(), index);
                }
            }
        }
        Ok(())
    }

    fn insert_node(&mut self, position: usize, json: &NodeJson) -> Result<(), AnalysisError> {
        let (uuid, id) = identity(&json.uuid, &json.id)
            .ok_or_else(|| schema(format!("Node #{} has neither uuid nor id", position)))?;

        let entry = json.entry.clone().unwrap_or_default();
        let entry_weight = entry.entry_weight.unwrap_or(1.0);
        if entry_weight < 0.0 || entry_weight.is_nan() {
            return Err(validation(format!(
                "Node '{}' has negative entry weight {}",
                id, entry_weight
            )));
        }

        let case = match &json.case {
            Some(case) => {
                let case_id = case.id.clone().unwrap_or_else(|| id.clone());
                let mut seen = HashSet::new();
                let mut total = 0.0;
                for variant in &case.variants {
                    check_probability(variant.weight, || {
                        format!("Weight of variant '{}' in case '{}'", variant.name, case_id)
                    })?;
                    if !seen.insert(variant.name.as_str()) {
                        return Err(schema(format!(
                            "Case '{}' declares variant '{}' twice",
                            case_id, variant.name
                        )));
                    }
                    total += variant.weight;
                }
                if (total - 1.0).abs() > CASE_WEIGHT_TOLERANCE {
                    return Err(schema(format!(
                        "Variant weights of case '{}' sum to {}, expected 1",
                        case_id, total
                    )));
                }
                Some(CaseDefinition {
                    case_id,
                    variants: case
                        .variants
                        .iter()
                        .map(|v| CaseVariant {
                            name: v.name.clone(),
                            weight: v.weight,
                        })
                        .collect(),
                })
            }
            None => None,
        };

        let index = self.graph.add_node(FunnelNode {
            uuid: uuid.clone(),
            id: id.clone(),
            label: json.label.clone(),
            is_entry: json.is_entry || entry.is_start,
            entry_weight,
            is_absorbing: json.is_absorbing,
            outcome_type: json.outcome_type.clone(),
            case: case.clone(),
        });
        Self::register_identity(&mut self.node_lookup, "node", &uuid, &id, index)?;

        if let Some(case) = case {
            if self.case_nodes.insert(case.case_id.clone(), index).is_some() {
                return Err(schema(format!("Duplicate case id '{}'", case.case_id)));
            }
        }

        Ok(())
    }

    fn insert_edge(
        &mut self,
        position: usize,
        json: &crate::graph::types::EdgeJson,
    ) -> Result<(EdgeIndex, Option<f64>), AnalysisError> {
        let from = self.node_index(&json.from).ok_or_else(|| {
            schema(format!("Edge #{} references unknown source '{}'", position, json.from))
        })?;
        let to = self.node_index(&json.to).ok_or_else(|| {
            schema(format!("Edge #{} references unknown target '{}'", position, json.to))
        })?;

        let (uuid, id) = identity(&json.uuid, &json.id).unwrap_or_else(|| {
            let derived = format!("{}->{}", self.graph[from].id, self.graph[to].id);
            (derived.clone(), derived)
        });
        for key in [&uuid, &id] {
            if self.node_lookup.contains_key(key) {
                return Err(schema(format!(
                    "Edge identifier '{}' collides with a node identifier",
                    key
                )));
            }
            if self.edge_lookup.contains_key(key) {
                return Err(schema(format!("Duplicate edge identifier '{}'", key)));
            }
        }

        let (case, probability) = match (&json.case_id, &json.case_variant) {
            (Some(case_ref), Some(variant)) => {
                let case_node = self.case_node(case_ref).ok_or_else(|| {
                    schema(format!("Edge '{}' references unknown case '{}'", id, case_ref))
                })?;
                if case_node != from {
                    return Err(schema(format!(
                        "Case edge '{}' must leave its case node '{}'",
                        id, self.graph[case_node].id
                    )));
                }
                let definition = self.graph[case_node]
                    .case
                    .as_ref()
                    .ok_or_else(|| schema(format!("Node for case '{}' has no case definition", case_ref)))?;
                let weight = definition.weight(variant).ok_or_else(|| {
                    schema(format!(
                        "Edge '{}' references unknown variant '{}' of case '{}'",
                        id, variant, definition.case_id
                    ))
                })?;
                (
                    Some(CaseBinding {
                        case_id: definition.case_id.clone(),
                        variant: variant.clone(),
                    }),
                    Some(weight),
                )
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(schema(format!(
                    "Edge '{}' must set both case_id and case_variant",
                    id
                )))
            }
            (None, None) => {
                let probability = match &json.p {
                    Some(ProbabilityParam { mean, .. }) => {
                        Some(check_probability(*mean, || format!("Probability of edge '{}'", id))?)
                    }
                    None => None,
                };
                (None, probability)
            }
        };

        let mut conditionals = Vec::with_capacity(json.conditional_p.len());
        for entry in &json.conditional_p {
            let probability = check_probability(entry.p.mean, || {
                format!("Conditional probability '{}' on edge '{}'", entry.condition, id)
            })?;
            let condition = self.parse_condition(&entry.condition)?;
            conditionals.push(ConditionalProbability {
                condition,
                probability,
            });
        }

        let cost = EdgeCost {
            monetary: check_cost(&json.cost_monetary, &id, "monetary")?,
            time: check_cost(&json.cost_time, &id, "time")?,
        };
        if self.cost_units.monetary.is_none() {
            self.cost_units.monetary = json.cost_monetary.as_ref().and_then(|c| c.units.clone());
        }
        if self.cost_units.time.is_none() {
            self.cost_units.time = json.cost_time.as_ref().and_then(|c| c.units.clone());
        }

        let index = self.graph.add_edge(
            from,
            to,
            FunnelEdge {
                uuid: uuid.clone(),
                id: id.clone(),
                probability: probability.unwrap_or(0.0),
                stdev: json.p.as_ref().and_then(|p| p.stdev),
                distribution: json.p.as_ref().and_then(|p| p.distribution.clone()),
                conditionals,
                cost,
                case,
            },
        );
        self.edge_lookup.insert(uuid, index);
        self.edge_lookup.insert(id, index);

        Ok((index, probability))
    }

    /// Applies the free-edge and overflow policies at one branch point
    fn resolve_branch_point(
        &mut self,
        node: NodeIndex,
        explicit: &HashMap<EdgeIndex, Option<f64>>,
    ) -> Result<(), AnalysisError> {
        let edges = self.out_edges(node);
        if edges.is_empty() {
            return Ok(());
        }

        let explicit_sum: f64 = edges
            .iter()
            .filter_map(|e| explicit.get(e).copied().flatten())
            .sum();
        let free: Vec<EdgeIndex> = edges
            .iter()
            .copied()
            .filter(|e| matches!(explicit.get(e), Some(None)))
            .collect();

        if explicit_sum > 1.0 + PROBABILITY_EPSILON {
            match self.policies.overflow_policy {
                OverflowPolicy::Error => {
                    return Err(validation(format!(
                        "Outgoing probabilities of '{}' sum to {}, exceeding 1",
                        self.graph[node].id, explicit_sum
                    )))
                }
                OverflowPolicy::Normalize => {
                    for &edge in &edges {
                        self.graph[edge].probability /= explicit_sum;
                    }
                }
                OverflowPolicy::Cap => {
                    let mut remaining = 1.0;
                    for &edge in &edges {
                        let capped = self.graph[edge].probability.min(remaining);
                        self.graph[edge].probability = capped;
                        remaining -= capped;
                    }
                }
            }
            return Ok(());
        }

        if !free.is_empty() {
            let share = match self.policies.free_edge_policy {
                FreeEdgePolicy::Complement => (1.0 - explicit_sum).max(0.0) / free.len() as f64,
                FreeEdgePolicy::Zero => 0.0,
            };
            for edge in free {
                self.graph[edge].probability = share;
            }
        }

        Ok(())
    }

    /// Looks up a node by uuid or id
    pub fn node_index(&self, reference: &str) -> Option<NodeIndex> {
        self.node_lookup.get(reference).copied()
    }

    /// Looks up a node, failing with a validation error when it is unknown
    pub fn require_node(&self, reference: &str) -> Result<NodeIndex, AnalysisError> {
        self.node_index(reference)
            .ok_or_else(|| validation(format!("Node '{}' not found", reference)))
    }

    /// Looks up an edge by uuid or id
    pub fn edge_index(&self, reference: &str) -> Option<EdgeIndex> {
        self.edge_lookup.get(reference).copied()
    }

    pub fn node(&self, index: NodeIndex) -> &FunnelNode {
        &self.graph[index]
    }

    pub fn edge(&self, index: EdgeIndex) -> &FunnelEdge {
        &self.graph[index]
    }

    /// Human id of a node
    pub fn node_id(&self, index: NodeIndex) -> &str {
        &self.graph[index].id
    }

    pub fn endpoints(&self, edge: EdgeIndex) -> (NodeIndex, NodeIndex) {
        // Indices handed out by this graph are always valid
        self.graph
            .edge_endpoints(edge)
            .unwrap_or((NodeIndex::end(), NodeIndex::end()))
    }

    /// Outgoing edges in declaration order
    pub fn out_edges(&self, node: NodeIndex) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| e.id())
            .collect();
        edges.sort();
        edges
    }

    /// Incoming edges in declaration order
    pub fn in_edges(&self, node: NodeIndex) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .map(|e| e.id())
            .collect();
        edges.sort();
        edges
    }

    pub fn children(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut children = Vec::new();
        for edge in self.out_edges(node) {
            let (_, target) = self.endpoints(edge);
            if !children.contains(&target) {
                children.push(target);
            }
        }
        children
    }

    pub fn parents(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut parents = Vec::new();
        for edge in self.in_edges(node) {
            let (source, _) = self.endpoints(edge);
            if !parents.contains(&source) {
                parents.push(source);
            }
        }
        parents
    }

    pub fn has_edge(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.graph.find_edge(from, to).is_some()
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn entry_nodes(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&n| self.graph[n].is_entry)
            .collect()
    }

    /// Nodes reachable from `start` (inclusive) over edges accepted by `follow`
    pub fn reachable_from<F>(&self, start: NodeIndex, follow: F) -> HashSet<NodeIndex>
    where
        F: Fn(EdgeIndex) -> bool,
    {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(start);
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            for edge in self.graph.edges_directed(node, Direction::Outgoing) {
                if !follow(edge.id()) {
                    continue;
                }
                if seen.insert(edge.target()) {
                    queue.push_back(edge.target());
                }
            }
        }
        seen
    }

    /// Nodes that can reach `target` (inclusive) over edges accepted by `follow`
    pub fn reaching<F>(&self, target: NodeIndex, follow: F) -> HashSet<NodeIndex>
    where
        F: Fn(EdgeIndex) -> bool,
    {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(target);
        queue.push_back(target);
        while let Some(node) = queue.pop_front() {
            for edge in self.graph.edges_directed(node, Direction::Incoming) {
                if !follow(edge.id()) {
                    continue;
                }
                if seen.insert(edge.source()) {
                    queue.push_back(edge.source());
                }
            }
        }
        seen
    }

    /// Case node by case id, node uuid or node id
    pub fn case_node(&self, reference: &str) -> Option<NodeIndex> {
        self.case_nodes.get(reference).copied().or_else(|| {
            self.node_index(reference)
                .filter(|&n| self.graph[n].case.is_some())
        })
    }

    pub fn case_definition(&self, reference: &str) -> Option<&CaseDefinition> {
        self.case_node(reference)
            .and_then(|n| self.graph[n].case.as_ref())
    }

    /// Parses a condition against this graph's nodes and cases.
    ///
    /// # Errors
    /// `Schema` for malformed text or unknown node, case or variant references.
    pub fn parse_condition(&self, text: &str) -> Result<Condition, AnalysisError> {
        Condition::parse(
            text,
            |node| {
                self.node_index(node)
                    .map(|index| (index, self.node_id(index).to_string()))
            },
            |case, variant| self.resolve_case_variant(case, variant),
        )
    }

    /// Canonical case id for `(case, variant)` when both exist
    pub fn resolve_case_variant(&self, case: &str, variant: &str) -> Option<String> {
        self.case_definition(case)
            .filter(|definition| definition.weight(variant).is_some())
            .map(|definition| definition.case_id.clone())
    }

    pub fn policies(&self) -> &Policies {
        &self.policies
    }

    pub fn cost_units(&self) -> &CostUnits {
        &self.cost_units
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::{branching_graph, edge, node};
    use crate::graph::types::{CaseJson, PoliciesJson, VariantJson};

    #[test]
    fn builds_branching_graph() {
        let graph = FunnelGraph::build(&branching_graph()).unwrap();
        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.edge_count(), 6);

        let a = graph.node_index("A").unwrap();
        let children: Vec<&str> = graph
            .children(a)
            .into_iter()
            .map(|n| graph.node_id(n))
            .collect();
        assert_eq!(children, vec!["B1", "B2", "B3"]);
        assert_eq!(graph.entry_nodes(), vec![a]);
        let c = graph.node_index("C").unwrap();
        assert!(graph.reachable_from(a, |_| true).contains(&c));
        assert!(!graph.reachable_from(c, |_| true).contains(&a));
    }

    #[test]
    fn uuid_and_id_both_resolve() {
        let mut json = branching_graph();
        json.nodes[0].uuid = Some("uuid-a".to_string());
        let graph = FunnelGraph::build(&json).unwrap();
        assert_eq!(graph.node_index("uuid-a"), graph.node_index("A"));
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let mut json = branching_graph();
        json.nodes.push(node("B1"));
        let err = FunnelGraph::build(&json).unwrap_err();
        assert!(matches!(err, AnalysisError::Schema(msg) if msg.contains("Duplicate node")));
    }

    #[test]
    fn duplicate_edge_ids_are_rejected() {
        let mut json = branching_graph();
        json.edges[0].id = Some("e".to_string());
        json.edges[1].id = Some("e".to_string());
        assert!(matches!(
            FunnelGraph::build(&json),
            Err(AnalysisError::Schema(_))
        ));
    }

    #[test]
    fn dangling_edges_are_rejected() {
        let mut json = branching_graph();
        json.edges.push(edge("C", "nowhere", Some(0.5)));
        let err = FunnelGraph::build(&json).unwrap_err();
        assert!(matches!(err, AnalysisError::Schema(msg) if msg.contains("nowhere")));
    }

    #[test]
    fn absorbing_node_with_outgoing_edges_is_rejected() {
        let mut json = branching_graph();
        json.nodes[4].is_absorbing = true;
        json.nodes.push(node("D"));
        json.edges.push(edge("C", "D", Some(1.0)));
        let err = FunnelGraph::build(&json).unwrap_err();
        assert!(matches!(err, AnalysisError::Schema(msg) if msg.contains("Absorbing")));
    }

    #[test]
    fn probability_out_of_range_is_validation_error() {
        let mut json = branching_graph();
        json.edges[0].p = Some(ProbabilityParam::new(1.5));
        assert!(matches!(
            FunnelGraph::build(&json),
            Err(AnalysisError::Validation(_))
        ));
    }

    #[test]
    fn overflow_policy_controls_sibling_sums() {
        let mut json = branching_graph();
        json.edges[0].p = Some(ProbabilityParam::new(0.6));
        assert!(matches!(
            FunnelGraph::build(&json),
            Err(AnalysisError::Validation(_))
        ));

        json.policies = PoliciesJson {
            overflow_policy: OverflowPolicy::Normalize,
            ..PoliciesJson::default()
        };
        let graph = FunnelGraph::build(&json).unwrap();
        let a = graph.node_index("A").unwrap();
        let sum: f64 = graph
            .out_edges(a)
            .iter()
            .map(|&e| graph.edge(e).probability)
            .sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn free_edges_take_the_complement() {
        let mut json = branching_graph();
        json.edges[2].p = None;
        let graph = FunnelGraph::build(&json).unwrap();
        let e = graph.edge_index("A->B3").unwrap();
        assert!((graph.edge(e).probability - 0.2).abs() < 1e-12);
    }

    #[test]
    fn case_edges_take_variant_weights() {
        let mut json = branching_graph();
        json.nodes.push(NodeJson {
            id: Some("test".to_string()),
            case: Some(CaseJson {
                id: Some("checkout_test".to_string()),
                variants: vec![
                    VariantJson {
                        name: "control".to_string(),
                        weight: 0.25,
                    },
                    VariantJson {
                        name: "treatment".to_string(),
                        weight: 0.75,
                    },
                ],
            }),
            ..NodeJson::default()
        });
        let mut treatment = edge("test", "C", Some(0.1));
        treatment.case_id = Some("checkout_test".to_string());
        treatment.case_variant = Some("treatment".to_string());
        json.edges.push(treatment);

        let graph = FunnelGraph::build(&json).unwrap();
        let e = graph.edge_index("test->C").unwrap();
        assert_eq!(graph.edge(e).probability, 0.75);
        assert_eq!(
            graph.resolve_case_variant("test", "control").as_deref(),
            Some("checkout_test")
        );
    }

    #[test]
    fn case_weights_must_sum_to_one() {
        let mut json = branching_graph();
        json.nodes.push(NodeJson {
            id: Some("test".to_string()),
            case: Some(CaseJson {
                id: None,
                variants: vec![VariantJson {
                    name: "control".to_string(),
                    weight: 0.5,
                }],
            }),
            ..NodeJson::default()
        });
        assert!(matches!(
            FunnelGraph::build(&json),
            Err(AnalysisError::Schema(_))
        ));
    }
}
