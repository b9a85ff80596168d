//! Evaluable conditions for `conditional_p` entries

use crate::dsl::{parse_condition, ParsedQuery};
use crate::error::AnalysisError;
use daggy::NodeIndex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// State a condition is evaluated against
pub struct EvalState<'a> {
    /// Nodes visited so far on the current path (including the current node)
    pub visited: &'a HashSet<NodeIndex>,
    pub context: &'a BTreeMap<String, String>,
    /// Case id -> chosen variant, from overrides and case edges already taken
    pub cases: &'a BTreeMap<String, String>,
}

/// A parsed and resolved condition
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Canonical DSL text over resolved node and case ids; conditional
    /// overrides are keyed by it
    pub key: String,
    pub visited: Vec<NodeIndex>,
    pub visited_any: Vec<Vec<NodeIndex>>,
    pub exclude: Vec<NodeIndex>,
    pub context: Vec<(String, String)>,
    pub cases: Vec<(String, String)>,
}

impl Condition {
    /// Parses `text` and resolves its node and case references.
    ///
    /// `resolve_node` maps a node uuid/id to its index and canonical id;
    /// `resolve_case` maps a `(case, variant)` pair to the canonical case id,
    /// or `None` when the case or variant does not exist.
    pub fn parse<N, C>(text: &str, resolve_node: N, resolve_case: C) -> Result<Self, AnalysisError>
    where
        N: Fn(&str) -> Option<(NodeIndex, String)>,
        C: Fn(&str, &str) -> Option<String>,
    {
        let parsed = parse_condition(text).map_err(|err| {
            AnalysisError::Schema(format!("Invalid condition '{}': {}", text, err))
        })?;
        Self::from_parsed(&parsed, resolve_node, resolve_case)
    }

    fn from_parsed<N, C>(
        parsed: &ParsedQuery,
        resolve_node: N,
        resolve_case: C,
    ) -> Result<Self, AnalysisError>
    where
        N: Fn(&str) -> Option<(NodeIndex, String)>,
        C: Fn(&str, &str) -> Option<String>,
    {
        let mut node_names: HashMap<String, String> = HashMap::new();
        let mut case_names: HashMap<String, String> = HashMap::new();

        let mut node = |id: &String| {
            let (index, name) = resolve_node(id).ok_or_else(|| {
                AnalysisError::Schema(format!(
                    "Condition '{}' references unknown node '{}'",
                    parsed, id
                ))
            })?;
            node_names.insert(id.clone(), name);
            Ok::<_, AnalysisError>(index)
        };

        let visited = parsed.visited.iter().map(&mut node).collect::<Result<Vec<_>, _>>()?;
        let visited_any = parsed
            .visited_any
            .iter()
            .map(|group| group.iter().map(&mut node).collect::<Result<Vec<_>, _>>())
            .collect::<Result<Vec<_>, _>>()?;
        let exclude = parsed.exclude.iter().map(&mut node).collect::<Result<Vec<_>, _>>()?;

        let mut cases = Vec::with_capacity(parsed.cases.len());
        for selector in &parsed.cases {
            let case_id = resolve_case(&selector.case_id, &selector.variant).ok_or_else(|| {
                AnalysisError::Schema(format!(
                    "Condition '{}' references unknown case variant '{}:{}'",
                    parsed, selector.case_id, selector.variant
                ))
            })?;
            case_names.insert(selector.case_id.clone(), case_id.clone());
            cases.push((case_id, selector.variant.clone()));
        }

        let canonical = parsed.renamed(
            |id| node_names.get(id).cloned().unwrap_or_else(|| id.to_string()),
            |case| case_names.get(case).cloned().unwrap_or_else(|| case.to_string()),
        );

        Ok(Condition {
            key: canonical.to_string(),
            visited,
            visited_any,
            exclude,
            context: parsed
                .context
                .iter()
                .map(|c| (c.key.clone(), c.value.clone()))
                .collect(),
            cases,
        })
    }

    /// All clauses must hold.
    pub fn is_satisfied(&self, state: &EvalState<'_>) -> bool {
        self.visited.iter().all(|n| state.visited.contains(n))
            && self
                .visited_any
                .iter()
                .all(|group| group.iter().any(|n| state.visited.contains(n)))
            && self.exclude.iter().all(|n| !state.visited.contains(n))
            && self
                .context
                .iter()
                .all(|(k, v)| state.context.get(k) == Some(v))
            && self
                .cases
                .iter()
                .all(|(case_id, variant)| state.cases.get(case_id) == Some(variant))
    }

    /// Nodes whose visit status can change the outcome
    pub fn referenced_nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.visited
            .iter()
            .chain(self.visited_any.iter().flatten())
            .chain(self.exclude.iter())
            .copied()
    }

    pub fn referenced_cases(&self) -> impl Iterator<Item = &str> + '_ {
        self.cases.iter().map(|(case_id, _)| case_id.as_str())
    }
}
