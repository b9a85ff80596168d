//! Wire-level graph snapshot as produced by the graph editor

use serde::{Deserialize, Serialize};

/// Probability parameter `{mean, stdev, distribution}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityParam {
    pub mean: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdev: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<String>,
}

impl ProbabilityParam {
    pub fn new(mean: f64) -> Self {
        ProbabilityParam {
            mean,
            stdev: None,
            distribution: None,
        }
    }
}

/// Cost parameter for one unit (monetary or time)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostParam {
    pub mean: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdev: Option<f64>,
    /// Currency code or time unit label
    #[serde(default, alias = "currency", skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

/// Entry marker in the nested `entry: {is_start}` form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryJson {
    #[serde(default)]
    pub is_start: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantJson {
    pub name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseJson {
    /// Case identifier used by `case(...)` conditions; defaults to the node id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub variants: Vec<VariantJson>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub is_entry: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<EntryJson>,
    #[serde(default, alias = "absorbing")]
    pub is_absorbing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case: Option<CaseJson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalProbabilityJson {
    pub condition: String,
    pub p: ProbabilityParam,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<ProbabilityParam>,
    #[serde(default)]
    pub conditional_p: Vec<ConditionalProbabilityJson>,
    #[serde(default, alias = "cost_gbp", skip_serializing_if = "Option::is_none")]
    pub cost_monetary: Option<CostParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_time: Option<CostParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_variant: Option<String>,
}

/// What to do when sibling probabilities sum above 1
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    #[default]
    Error,
    Normalize,
    Cap,
}

/// How edges without an explicit `p` are resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeEdgePolicy {
    #[default]
    Complement,
    Zero,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoliciesJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_outcome: Option<String>,
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
    #[serde(default)]
    pub free_edge_policy: FreeEdgePolicy,
}

/// Graph snapshot `{nodes, edges, policies}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphJson {
    pub nodes: Vec<NodeJson>,
    pub edges: Vec<EdgeJson>,
    #[serde(default)]
    pub policies: PoliciesJson,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_editor_aliases() {
        let graph: GraphJson = serde_json::from_value(serde_json::json!({
            "nodes": [
                {"uuid": "n-1", "id": "landing", "entry": {"is_start": true}},
                {"id": "done", "absorbing": true}
            ],
            "edges": [
                {"from": "landing", "to": "done", "p": {"mean": 0.4}, "cost_gbp": {"mean": 2.5, "currency": "GBP"}}
            ],
            "policies": {"overflow_policy": "normalize"}
        }))
        .unwrap();

        assert!(graph.nodes[0].entry.as_ref().unwrap().is_start);
        assert!(graph.nodes[1].is_absorbing);
        let cost = graph.edges[0].cost_monetary.as_ref().unwrap();
        assert_eq!(cost.mean, 2.5);
        assert_eq!(cost.units.as_deref(), Some("GBP"));
        assert_eq!(graph.policies.overflow_policy, OverflowPolicy::Normalize);
        assert_eq!(graph.policies.free_edge_policy, FreeEdgePolicy::Complement);
    }
}
