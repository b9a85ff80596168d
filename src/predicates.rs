//! Selection predicates
//!
//! Describes the shape of a node selection (start/end uniqueness, sequence,
//! sibling structure) so the analysis adaptor can pick a runner.

use crate::dsl::ParsedQuery;
use crate::error::AnalysisError;
use crate::graph::FunnelGraph;
use daggy::petgraph::algo::toposort;
use daggy::{Dag, NodeIndex};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Selected nodes sharing one immediate parent in the full graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiblingGroup {
    pub parent: String,
    pub members: Vec<String>,
}

/// Predicates over a node selection
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectionPredicates {
    pub node_count: usize,
    pub all_absorbing: bool,
    pub all_entry: bool,
    pub has_unique_start: bool,
    pub has_unique_end: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_node: Option<String>,
    pub is_sequential: bool,
    /// Topological order of the selection when it is sequential
    pub sequence: Vec<String>,
    /// Set when the induced subgraph contains a cycle
    pub sequential_fallback: bool,
    pub sibling_groups: Vec<SiblingGroup>,
    pub all_siblings: bool,
    pub sibling_ambiguous: bool,
    pub has_from: bool,
    pub has_to: bool,
    pub has_visited: bool,
    pub has_visited_any: bool,
    pub has_exclude: bool,
    pub has_compare: bool,
}

impl SelectionPredicates {
    /// Computes predicates for `selected` node ids against the full graph.
    ///
    /// # Errors
    /// `Validation` if a selected id is not in the graph.
    pub fn compute(graph: &FunnelGraph, selected: &[String]) -> Result<Self, AnalysisError> {
        let mut nodes: Vec<NodeIndex> = Vec::with_capacity(selected.len());
        for id in selected {
            let index = graph.require_node(id)?;
            if !nodes.contains(&index) {
                nodes.push(index);
            }
        }

        let mut predicates = SelectionPredicates {
            node_count: nodes.len(),
            ..SelectionPredicates::default()
        };
        if nodes.is_empty() {
            return Ok(predicates);
        }

        predicates.all_absorbing = nodes.iter().all(|&n| graph.node(n).is_absorbing);
        predicates.all_entry = nodes.iter().all(|&n| graph.node(n).is_entry);

        let starts: Vec<NodeIndex> = nodes
            .iter()
            .copied()
            .filter(|&n| !graph.parents(n).iter().any(|p| *p != n && nodes.contains(p)))
            .collect();
        let ends: Vec<NodeIndex> = nodes
            .iter()
            .copied()
            .filter(|&n| !graph.children(n).iter().any(|c| *c != n && nodes.contains(c)))
            .collect();
        if let [start] = starts.as_slice() {
            predicates.has_unique_start = true;
            predicates.start_node = Some(graph.node_id(*start).to_string());
        }
        if let [end] = ends.as_slice() {
            predicates.has_unique_end = true;
            predicates.end_node = Some(graph.node_id(*end).to_string());
        }

        match sequence(graph, &nodes) {
            Some(order) => {
                predicates.is_sequential = order
                    .windows(2)
                    .all(|pair| graph.has_edge(pair[0], pair[1]));
                if predicates.is_sequential {
                    predicates.sequence = order
                        .iter()
                        .map(|&n| graph.node_id(n).to_string())
                        .collect();
                }
            }
            None => {
                predicates.sequential_fallback = true;
            }
        }

        predicates.sibling_groups = sibling_groups(graph, &nodes);
        predicates.sibling_ambiguous = is_ambiguous(&predicates.sibling_groups);
        predicates.all_siblings = nodes.len() >= 2
            && !predicates.sibling_ambiguous
            && predicates
                .sibling_groups
                .iter()
                .any(|group| group.members.len() == nodes.len());

        debug!(
            node_count = predicates.node_count,
            is_sequential = predicates.is_sequential,
            sibling_groups = predicates.sibling_groups.len(),
            "Computed selection predicates"
        );

        Ok(predicates)
    }

    /// Fills the query-shape flags.
    pub fn with_query(mut self, query: &ParsedQuery) -> Self {
        self.has_from = query.from.is_some();
        self.has_to = query.to.is_some();
        self.has_visited = !query.visited.is_empty();
        self.has_visited_any = !query.visited_any.is_empty();
        self.has_exclude = !query.exclude.is_empty();
        self.has_compare = !query.compare.is_empty();
        self
    }

    /// Predicate value by name, `None` when unknown or unset
    pub fn get(&self, key: &str) -> Option<Value> {
        self.to_map().remove(key)
    }

    /// Predicates keyed by name; unset optional predicates are absent.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .collect(),
            _ => Map::new(),
        }
    }
}

/// Topological order of the induced subgraph, or `None` if it has a cycle
fn sequence(graph: &FunnelGraph, nodes: &[NodeIndex]) -> Option<Vec<NodeIndex>> {
    let mut dag: Dag<NodeIndex, ()> = Dag::new();
    let mut local: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    for &node in nodes {
        local.insert(node, dag.add_node(node));
    }

    for &from in nodes {
        for to in graph.children(from) {
            if let Some(&target) = local.get(&to) {
                if dag.add_edge(local[&from], target, ()).is_err() {
                    return None;
                }
            }
        }
    }

    toposort(dag.graph(), None)
        .ok()
        .map(|order| order.into_iter().map(|idx| dag[idx]).collect())
}

fn sibling_groups(graph: &FunnelGraph, nodes: &[NodeIndex]) -> Vec<SiblingGroup> {
    let mut groups = Vec::new();
    for parent in graph.node_indices() {
        let children = graph.children(parent);
        let members: Vec<String> = nodes
            .iter()
            .filter(|n| children.contains(*n))
            .map(|&n| graph.node_id(n).to_string())
            .collect();
        if members.len() >= 2 {
            groups.push(SiblingGroup {
                parent: graph.node_id(parent).to_string(),
                members,
            });
        }
    }
    groups
}

/// A node belonging to groups with different member sets cannot be grouped
/// without user disambiguation.
fn is_ambiguous(groups: &[SiblingGroup]) -> bool {
    groups.iter().enumerate().any(|(i, a)| {
        groups[i + 1..].iter().any(|b| {
            a.members != b.members && a.members.iter().any(|m| b.members.contains(m))
        })
    })
}
