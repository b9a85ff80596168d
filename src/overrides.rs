//! Scenario parameter overrides
//!
//! Wire form keyed by user-facing identifiers, and the resolved form the
//! path runner consumes.

use crate::dsl::CaseSelector;
use crate::error::AnalysisError;
use crate::graph::FunnelGraph;
use daggy::EdgeIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Overrides as supplied in a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamOverrides {
    /// case id (or case node uuid/id) -> forced variant
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub case_overrides: BTreeMap<String, String>,
    /// condition text -> forced active/inactive
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conditional_overrides: BTreeMap<String, bool>,
    /// edge uuid/id -> probability
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub probability_overrides: BTreeMap<String, f64>,
}

impl ParamOverrides {
    pub fn is_empty(&self) -> bool {
        self.case_overrides.is_empty()
            && self.conditional_overrides.is_empty()
            && self.probability_overrides.is_empty()
    }

    /// Resolves references against `graph`.
    ///
    /// # Errors
    /// `Validation` for unknown edges, cases or variants, condition keys that
    /// are malformed or name unknown nodes, or probabilities outside `[0, 1]`.
    pub fn resolve(&self, graph: &FunnelGraph) -> Result<ResolvedOverrides, AnalysisError> {
        let mut resolved = ResolvedOverrides::default();

        for (case, variant) in &self.case_overrides {
            let case_id = graph.resolve_case_variant(case, variant).ok_or_else(|| {
                AnalysisError::Validation(format!(
                    "Case override '{}:{}' references an unknown case or variant",
                    case, variant
                ))
            })?;
            resolved.cases.insert(case_id, variant.clone());
        }

        for (condition, active) in &self.conditional_overrides {
            let key = graph
                .parse_condition(condition)
                .map_err(|err| match err {
                    AnalysisError::Schema(msg) => {
                        AnalysisError::Validation(format!("Conditional override: {}", msg))
                    }
                    other => other,
                })?
                .key;
            resolved.conditionals.insert(key, *active);
        }

        for (edge, probability) in &self.probability_overrides {
            let index = graph.edge_index(edge).ok_or_else(|| {
                AnalysisError::Validation(format!("Probability override for unknown edge '{}'", edge))
            })?;
            if !(0.0..=1.0).contains(probability) {
                return Err(AnalysisError::Validation(format!(
                    "Probability override for edge '{}' must be within [0, 1], got {}",
                    edge, probability
                )));
            }
            resolved.probabilities.insert(index, *probability);
        }

        Ok(resolved)
    }
}

/// Overrides with graph references resolved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedOverrides {
    /// canonical case id -> variant
    pub cases: BTreeMap<String, String>,
    /// canonical condition key -> active
    pub conditionals: HashMap<String, bool>,
    pub probabilities: HashMap<EdgeIndex, f64>,
}

impl ResolvedOverrides {
    /// Variants pinned by a query's `case(...)` selectors.
    ///
    /// # Errors
    /// `Validation` for an unknown case or variant, or when two selectors pin
    /// one case to different variants.
    pub fn from_query_cases(
        graph: &FunnelGraph,
        selectors: &[CaseSelector],
    ) -> Result<Self, AnalysisError> {
        let mut resolved = ResolvedOverrides::default();
        for selector in selectors {
            let case_id = graph
                .resolve_case_variant(&selector.case_id, &selector.variant)
                .ok_or_else(|| {
                    AnalysisError::Validation(format!(
                        "Query case '{}:{}' references an unknown case or variant",
                        selector.case_id, selector.variant
                    ))
                })?;
            match resolved.cases.get(&case_id) {
                Some(existing) if *existing != selector.variant => {
                    return Err(AnalysisError::Validation(format!(
                        "Query selects case '{}' as both '{}' and '{}'",
                        case_id, existing, selector.variant
                    )));
                }
                _ => {
                    resolved.cases.insert(case_id, selector.variant.clone());
                }
            }
        }
        Ok(resolved)
    }

    /// Layers `top` over `self`; `top` wins on conflicts.
    pub fn overlay(mut self, top: &ResolvedOverrides) -> Self {
        self.cases
            .extend(top.cases.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.conditionals
            .extend(top.conditionals.iter().map(|(k, v)| (k.clone(), *v)));
        self.probabilities.extend(top.probabilities.iter());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::branching_graph;
    use crate::graph::{CaseJson, ConditionalProbabilityJson, ProbabilityParam, VariantJson};

    fn overrides(json: &str) -> ParamOverrides {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn overlay_wins_on_conflict() {
        let graph = FunnelGraph::build(&branching_graph()).unwrap();
        let scenario = overrides(r#"{"probability_overrides": {"A->B1": 0.1, "A->B2": 0.2}}"#)
            .resolve(&graph)
            .unwrap();
        let what_if = overrides(r#"{"probability_overrides": {"A->B1": 0.9}}"#)
            .resolve(&graph)
            .unwrap();
        let layered = scenario.overlay(&what_if);
        assert_eq!(layered.probabilities[&graph.edge_index("A->B1").unwrap()], 0.9);
        assert_eq!(layered.probabilities[&graph.edge_index("A->B2").unwrap()], 0.2);
    }

    #[test]
    fn condition_keys_match_across_aliases() {
        let mut json = branching_graph();
        json.nodes[1].uuid = Some("uuid-b1".to_string());
        json.edges[3].conditional_p = vec![ConditionalProbabilityJson {
            condition: "visited(uuid-b1)".to_string(),
            p: ProbabilityParam::new(0.5),
        }];
        let graph = FunnelGraph::build(&json).unwrap();
        let edge_key = &graph
            .edge(graph.edge_index("B1->C").unwrap())
            .conditionals[0]
            .condition
            .key;
        assert_eq!(edge_key, "visited(B1)");

        for text in ["visited(B1)", "visited( uuid-b1 )"] {
            let resolved = overrides(&format!(r#"{{"conditional_overrides": {{"{}": false}}}}"#, text))
                .resolve(&graph)
                .unwrap();
            assert_eq!(resolved.conditionals.get(edge_key), Some(&false));
        }

        let unknown = overrides(r#"{"conditional_overrides": {"visited(nope)": true}}"#);
        assert!(matches!(
            unknown.resolve(&graph),
            Err(AnalysisError::Validation(_))
        ));
    }

    #[test]
    fn query_cases_resolve_or_conflict() {
        let mut json = branching_graph();
        json.nodes[1].case = Some(CaseJson {
            id: Some("promo".to_string()),
            variants: vec![
                VariantJson { name: "on".to_string(), weight: 0.5 },
                VariantJson { name: "off".to_string(), weight: 0.5 },
            ],
        });
        let graph = FunnelGraph::build(&json).unwrap();
        let selectors = |pairs: &[(&str, &str)]| -> Vec<CaseSelector> {
            pairs
                .iter()
                .map(|(case_id, variant)| CaseSelector {
                    case_id: case_id.to_string(),
                    variant: variant.to_string(),
                })
                .collect()
        };

        // The case node id is an alias of its case id
        let resolved =
            ResolvedOverrides::from_query_cases(&graph, &selectors(&[("B1", "on")])).unwrap();
        assert_eq!(resolved.cases.get("promo").map(String::as_str), Some("on"));

        assert!(ResolvedOverrides::from_query_cases(&graph, &selectors(&[("promo", "maybe")])).is_err());
        assert!(ResolvedOverrides::from_query_cases(
            &graph,
            &selectors(&[("promo", "on"), ("B1", "off")])
        )
        .is_err());
    }

    #[test]
    fn resolves_edges_and_conditions() {
        let graph = FunnelGraph::build(&branching_graph()).unwrap();
        let resolved = overrides(
            r#"{"probability_overrides": {"A->B1": 0.4}, "conditional_overrides": {"visited( B1 )": true}}"#,
        )
        .resolve(&graph)
        .unwrap();
        let edge = graph.edge_index("A->B1").unwrap();
        assert_eq!(resolved.probabilities[&edge], 0.4);
        assert_eq!(resolved.conditionals.get("visited(B1)"), Some(&true));
    }

    #[test]
    fn rejects_unknown_edge_and_bad_probability() {
        let graph = FunnelGraph::build(&branching_graph()).unwrap();
        let unknown = overrides(r#"{"probability_overrides": {"nope": 0.4}}"#);
        assert!(matches!(
            unknown.resolve(&graph),
            Err(AnalysisError::Validation(_))
        ));
        let out_of_range = overrides(r#"{"probability_overrides": {"A->B1": 1.4}}"#);
        assert!(matches!(
            out_of_range.resolve(&graph),
            Err(AnalysisError::Validation(_))
        ));
        let unknown_case = overrides(r#"{"case_overrides": {"test": "control"}}"#);
        assert!(unknown_case.resolve(&graph).is_err());
    }
}
