//! Sibling pruning and renormalization
//!
//! `visited`/`visitedAny` clauses restrict the branch points feeding the named
//! nodes to those nodes, and several clauses on one branch point keep only
//! the children all of them allow; `exclude` clauses cut every edge into the
//! named node. Every branch point touched by a clause is renormalized so its
//! remaining outgoing probabilities sum to 1.

use crate::dsl::ParsedQuery;
use crate::error::AnalysisError;
use crate::graph::FunnelGraph;
use daggy::{EdgeIndex, NodeIndex};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use tracing::debug;

/// Graph view with clause-implied edges removed
#[derive(Debug, Clone)]
pub struct PrunedGraph<'g> {
    graph: &'g FunnelGraph,
    removed: BTreeSet<EdgeIndex>,
    touched: BTreeSet<NodeIndex>,
    /// Nodes every counted path must visit
    required: Vec<NodeIndex>,
    /// Groups of which every counted path must visit at least one member
    required_any: Vec<Vec<NodeIndex>>,
    excluded: Vec<NodeIndex>,
}

impl PartialEq for PrunedGraph<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.graph, other.graph)
            && self.removed == other.removed
            && self.touched == other.touched
    }
}

fn resolve_all(graph: &FunnelGraph, ids: &[String]) -> Result<Vec<NodeIndex>, AnalysisError> {
    let mut nodes = Vec::with_capacity(ids.len());
    for id in ids {
        let node = graph.require_node(id)?;
        if !nodes.contains(&node) {
            nodes.push(node);
        }
    }
    Ok(nodes)
}

/// Prunes `graph` for the given clauses.
///
/// # Errors
/// `Validation` if a clause names an unknown node, or a node is both
/// required and excluded.
pub fn prune<'g>(
    graph: &'g FunnelGraph,
    visited: &[String],
    visited_any: &[Vec<String>],
    exclude: &[String],
) -> Result<PrunedGraph<'g>, AnalysisError> {
    let required = resolve_all(graph, visited)?;
    let required_any = visited_any
        .iter()
        .map(|group| resolve_all(graph, group))
        .collect::<Result<Vec<_>, _>>()?;
    let excluded = resolve_all(graph, exclude)?;

    if let Some(&conflict) = required
        .iter()
        .find(|n| excluded.contains(n))
        .or_else(|| {
            required_any
                .iter()
                .find(|group| group.iter().all(|n| excluded.contains(n)))
                .and_then(|group| group.first())
        })
    {
        return Err(AnalysisError::Validation(format!(
            "Node '{}' is both required and excluded",
            graph.node_id(conflict)
        )));
    }

    // Each clause permits, at every parent of its nodes, the named children
    // and any sibling that still leads to one; a branch point keeps the
    // intersection over all clauses touching it
    let clauses = required
        .iter()
        .map(std::slice::from_ref)
        .chain(required_any.iter().map(Vec::as_slice));
    let mut kept: BTreeMap<NodeIndex, BTreeSet<NodeIndex>> = BTreeMap::new();
    for clause in clauses {
        let mut named: BTreeMap<NodeIndex, BTreeSet<NodeIndex>> = BTreeMap::new();
        for &node in clause {
            for parent in graph.parents(node) {
                named.entry(parent).or_default().insert(node);
            }
        }
        for (parent, targets) in named {
            let permitted: BTreeSet<NodeIndex> = graph
                .children(parent)
                .into_iter()
                .filter(|&child| {
                    let reach = graph.reachable_from(child, |_| true);
                    targets.iter().any(|t| reach.contains(t))
                })
                .collect();
            match kept.entry(parent) {
                Entry::Vacant(slot) => {
                    slot.insert(permitted);
                }
                Entry::Occupied(mut slot) => slot.get_mut().retain(|c| permitted.contains(c)),
            }
        }
    }

    let mut removed = BTreeSet::new();
    let mut touched = BTreeSet::new();

    for (&parent, keep) in &kept {
        touched.insert(parent);
        for edge in graph.out_edges(parent) {
            let (_, child) = graph.endpoints(edge);
            if !keep.contains(&child) {
                removed.insert(edge);
            }
        }
    }

    for &node in &excluded {
        for edge in graph.in_edges(node) {
            let (parent, _) = graph.endpoints(edge);
            removed.insert(edge);
            touched.insert(parent);
        }
    }

    debug!(
        removed = removed.len(),
        touched = touched.len(),
        "Pruned graph for clauses"
    );

    Ok(PrunedGraph {
        graph,
        removed,
        touched,
        required,
        required_any,
        excluded,
    })
}

impl<'g> PrunedGraph<'g> {
    /// Prunes for the clauses of a parsed query.
    ///
    /// # Errors
    /// As [`prune`], plus `Validation` when `from` or `to` is excluded.
    pub fn from_query(graph: &'g FunnelGraph, query: &ParsedQuery) -> Result<Self, AnalysisError> {
        let excluded = resolve_all(graph, &query.exclude)?;
        for endpoint in query.from.iter().chain(query.to.iter()) {
            let node = graph.require_node(endpoint)?;
            if excluded.contains(&node) {
                return Err(AnalysisError::Validation(format!(
                    "Cannot exclude path endpoint '{}'",
                    graph.node_id(node)
                )));
            }
        }
        prune(graph, &query.visited, &query.visited_any, &query.exclude)
    }

    /// A view of `graph` with no clauses applied
    pub fn unpruned(graph: &'g FunnelGraph) -> Self {
        PrunedGraph {
            graph,
            removed: BTreeSet::new(),
            touched: BTreeSet::new(),
            required: Vec::new(),
            required_any: Vec::new(),
            excluded: Vec::new(),
        }
    }

    pub fn graph(&self) -> &'g FunnelGraph {
        self.graph
    }

    pub fn is_removed(&self, edge: EdgeIndex) -> bool {
        self.removed.contains(&edge)
    }

    /// Whether a clause touched this branch point
    pub fn is_touched(&self, node: NodeIndex) -> bool {
        self.touched.contains(&node)
    }

    pub fn removed_edges(&self) -> &BTreeSet<EdgeIndex> {
        &self.removed
    }

    pub fn required(&self) -> &[NodeIndex] {
        &self.required
    }

    pub fn required_any(&self) -> &[Vec<NodeIndex>] {
        &self.required_any
    }

    pub fn excluded(&self) -> &[NodeIndex] {
        &self.excluded
    }

    /// Ids of removed edges in declaration order
    pub fn pruned_edges(&self) -> Vec<String> {
        self.removed
            .iter()
            .map(|&e| self.graph.edge(e).id.clone())
            .collect()
    }

    /// Outgoing edges that survived pruning
    pub fn kept_out_edges(&self, node: NodeIndex) -> Vec<EdgeIndex> {
        self.graph
            .out_edges(node)
            .into_iter()
            .filter(|e| !self.removed.contains(e))
            .collect()
    }

    /// Base probability of `edge` after renormalization at its branch point
    pub fn renormalized_probability(&self, edge: EdgeIndex) -> f64 {
        if self.removed.contains(&edge) {
            return 0.0;
        }
        let base = self.graph.edge(edge).probability;
        let (source, _) = self.graph.endpoints(edge);
        if !self.touched.contains(&source) {
            return base;
        }
        let total: f64 = self
            .kept_out_edges(source)
            .iter()
            .map(|&e| self.graph.edge(e).probability)
            .sum();
        if total > 0.0 {
            base / total
        } else {
            0.0
        }
    }

    pub fn reachable_from(&self, start: NodeIndex) -> HashSet<NodeIndex> {
        self.graph
            .reachable_from(start, |e| !self.removed.contains(&e))
    }

    pub fn reaching(&self, target: NodeIndex) -> HashSet<NodeIndex> {
        self.graph.reaching(target, |e| !self.removed.contains(&e))
    }

    /// Nodes on some `from -> to` path, in breadth-first order from `from`
    pub fn path_nodes(&self, from: NodeIndex, to: NodeIndex) -> Vec<NodeIndex> {
        let backward = self.reaching(to);
        if !backward.contains(&from) {
            return Vec::new();
        }

        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(from);
        queue.push_back(from);
        while let Some(node) = queue.pop_front() {
            order.push(node);
            if node == to {
                continue;
            }
            for edge in self.kept_out_edges(node) {
                let (_, child) = self.graph.endpoints(edge);
                if backward.contains(&child) && seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        order
    }
}
