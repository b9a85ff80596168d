#![allow(dead_code)]

use crate::graph::types::{EdgeJson, GraphJson, NodeJson, PoliciesJson, ProbabilityParam};

/// Test helper: plain node with an id.
pub(crate) fn node(id: &str) -> NodeJson {
    NodeJson {
        id: Some(id.to_string()),
        ..NodeJson::default()
    }
}

/// Test helper: entry node.
pub(crate) fn entry(id: &str) -> NodeJson {
    NodeJson {
        is_entry: true,
        ..node(id)
    }
}

/// Test helper: absorbing node.
pub(crate) fn absorbing(id: &str) -> NodeJson {
    NodeJson {
        is_absorbing: true,
        ..node(id)
    }
}

/// Test helper: edge with an optional explicit probability.
pub(crate) fn edge(from: &str, to: &str, p: Option<f64>) -> EdgeJson {
    EdgeJson {
        from: from.to_string(),
        to: to.to_string(),
        p: p.map(ProbabilityParam::new),
        ..EdgeJson::default()
    }
}

/// Test helper: `A -> {B1 .3, B2 .5, B3 .2} -> C`.
pub(crate) fn branching_graph() -> GraphJson {
    GraphJson {
        nodes: vec![entry("A"), node("B1"), node("B2"), node("B3"), node("C")],
        edges: vec![
            edge("A", "B1", Some(0.3)),
            edge("A", "B2", Some(0.5)),
            edge("A", "B3", Some(0.2)),
            edge("B1", "C", Some(1.0)),
            edge("B2", "C", Some(1.0)),
            edge("B3", "C", Some(1.0)),
        ],
        policies: PoliciesJson::default(),
    }
}

/// Test helper: non-branching chain with the given step probabilities.
pub(crate) fn chain(probabilities: &[f64]) -> GraphJson {
    let mut nodes = vec![entry("n0")];
    let mut edges = Vec::new();
    for (i, &p) in probabilities.iter().enumerate() {
        nodes.push(node(&format!("n{}", i + 1)));
        edges.push(edge(&format!("n{}", i), &format!("n{}", i + 1), Some(p)));
    }
    GraphJson {
        nodes,
        edges,
        policies: PoliciesJson::default(),
    }
}
