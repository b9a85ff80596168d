//! Declarative rule table mapping selection predicates to analysis runners

use crate::error::ConfigError;
use crate::predicates::SelectionPredicates;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, trace};

const DEFAULT_RULES: &str = include_str!("default_rules.json");

/// Runner an analysis rule dispatches to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    Path,
    ReachProbability,
    ConversionFunnel,
    OutcomeComparison,
    BranchComparison,
    GeneralSelection,
}

impl RunnerKind {
    pub const ALL: [RunnerKind; 6] = [
        RunnerKind::Path,
        RunnerKind::ReachProbability,
        RunnerKind::ConversionFunnel,
        RunnerKind::OutcomeComparison,
        RunnerKind::BranchComparison,
        RunnerKind::GeneralSelection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerKind::Path => "path",
            RunnerKind::ReachProbability => "reach_probability",
            RunnerKind::ConversionFunnel => "conversion_funnel",
            RunnerKind::OutcomeComparison => "outcome_comparison",
            RunnerKind::BranchComparison => "branch_comparison",
            RunnerKind::GeneralSelection => "general_selection",
        }
    }
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric bounds; every bound present must hold
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RangeCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
}

impl RangeCondition {
    fn is_empty(&self) -> bool {
        self.gte.is_none() && self.lte.is_none() && self.gt.is_none() && self.lt.is_none()
    }

    fn contains(&self, value: f64) -> bool {
        self.gte.map_or(true, |bound| value >= bound)
            && self.lte.map_or(true, |bound| value <= bound)
            && self.gt.map_or(true, |bound| value > bound)
            && self.lt.map_or(true, |bound| value < bound)
    }
}

/// Condition on one predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleCondition {
    /// Value must equal one of the listed values
    OneOf(Vec<Value>),
    Range(RangeCondition),
    Exact(Value),
}

/// Numbers compare by value so `2` matches `2.0`
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

impl RuleCondition {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            RuleCondition::OneOf(options) => options.iter().any(|o| values_equal(o, value)),
            RuleCondition::Range(range) => value.as_f64().map_or(false, |v| range.contains(v)),
            RuleCondition::Exact(expected) => values_equal(expected, value),
        }
    }
}

/// One entry of the rule table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub when: BTreeMap<String, RuleCondition>,
    pub runner: RunnerKind,
}

impl AnalysisDefinition {
    /// An empty `when` always matches
    pub fn is_fallback(&self) -> bool {
        self.when.is_empty()
    }

    /// AND across keys; a missing predicate never matches.
    pub fn matches(&self, predicates: &Map<String, Value>) -> bool {
        self.when.iter().all(|(key, condition)| {
            predicates
                .get(key)
                .map_or(false, |value| condition.matches(value))
        })
    }
}

/// Ordered list of analysis rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    #[serde(rename = "analysis_types")]
    pub rules: Vec<AnalysisDefinition>,
}

impl RuleTable {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|err| {
            ConfigError::Invalid(format!("cannot read '{}': {}", path.display(), err))
        })?;
        Self::from_json(&json)
    }

    /// The built-in table
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_json(DEFAULT_RULES)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let last = self.rules.last().ok_or(ConfigError::EmptyRuleTable)?;
        if !last.is_fallback() {
            return Err(ConfigError::MissingFallback(last.id.clone()));
        }

        let mut ids = HashSet::new();
        for (position, rule) in self.rules.iter().enumerate() {
            if !ids.insert(rule.id.as_str()) {
                return Err(ConfigError::DuplicateRule(rule.id.clone()));
            }
            if rule.is_fallback() && position + 1 != self.rules.len() {
                return Err(ConfigError::FallbackNotLast(rule.id.clone()));
            }
            for (key, condition) in &rule.when {
                if let RuleCondition::Range(range) = condition {
                    if range.is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "rule '{}' has an empty range for '{}'",
                            rule.id, key
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Picks the analysis for a selection by first-match over a validated table
#[derive(Debug, Clone)]
pub struct AnalysisAdaptor {
    table: RuleTable,
}

impl AnalysisAdaptor {
    pub fn new(table: RuleTable) -> Result<Self, ConfigError> {
        table.validate()?;
        debug!(rules = table.rules.len(), "Loaded analysis rule table");
        Ok(AnalysisAdaptor { table })
    }

    pub fn with_default_rules() -> Result<Self, ConfigError> {
        Self::new(RuleTable::embedded()?)
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// First rule whose conditions all hold. The terminal fallback
    /// guarantees a match.
    pub fn match_predicates(&self, predicates: &SelectionPredicates) -> &AnalysisDefinition {
        let map = predicates.to_map();
        let fallback = &self.table.rules[self.table.rules.len() - 1];
        let rule = self
            .table
            .rules
            .iter()
            .find(|rule| rule.matches(&map))
            .unwrap_or(fallback);
        trace!(rule = %rule.id, "Matched analysis rule");
        rule
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adaptor() -> AnalysisAdaptor {
        AnalysisAdaptor::with_default_rules().unwrap()
    }

    fn predicates(configure: impl FnOnce(&mut SelectionPredicates)) -> SelectionPredicates {
        let mut predicates = SelectionPredicates::default();
        configure(&mut predicates);
        predicates
    }

    #[test]
    fn default_table_is_valid() {
        let adaptor = adaptor();
        assert_eq!(adaptor.table().rules.len(), 8);
        assert!(adaptor.table().rules.last().unwrap().is_fallback());
    }

    #[test]
    fn single_node_matches_reach() {
        let p = predicates(|p| p.node_count = 1);
        assert_eq!(adaptor().match_predicates(&p).id, "single_node_reach");
    }

    #[test]
    fn from_and_to_match_path() {
        let p = predicates(|p| {
            p.node_count = 3;
            p.has_from = true;
            p.has_to = true;
            p.is_sequential = true;
        });
        let adaptor = adaptor();
        let rule = adaptor.match_predicates(&p);
        assert_eq!(rule.id, "path_between");
        assert_eq!(rule.runner, RunnerKind::Path);
    }

    #[test]
    fn sequential_selection_matches_funnel() {
        let p = predicates(|p| {
            p.node_count = 3;
            p.is_sequential = true;
            p.has_unique_start = true;
            p.has_unique_end = true;
        });
        assert_eq!(adaptor().match_predicates(&p).id, "conversion_funnel");
    }

    #[test]
    fn ambiguous_siblings_fall_through_to_general() {
        let p = predicates(|p| {
            p.node_count = 3;
            p.sibling_ambiguous = true;
        });
        assert_eq!(adaptor().match_predicates(&p).id, "general_selection");
    }

    #[test]
    fn missing_predicate_never_matches() {
        let table = RuleTable::from_json(
            r#"{"analysis_types": [
                {"id": "named", "name": "Named", "when": {"start_node": "A"}, "runner": "path"},
                {"id": "rest", "name": "Rest", "when": {}, "runner": "general_selection"}
            ]}"#,
        )
        .unwrap();
        let adaptor = AnalysisAdaptor::new(table).unwrap();
        assert_eq!(adaptor.match_predicates(&SelectionPredicates::default()).id, "rest");

        let p = predicates(|p| p.start_node = Some("A".to_string()));
        assert_eq!(adaptor.match_predicates(&p).id, "named");
    }

    #[test]
    fn condition_forms() {
        let range = RuleCondition::Range(RangeCondition {
            gt: Some(1.0),
            lte: Some(3.0),
            ..RangeCondition::default()
        });
        assert!(!range.matches(&Value::from(1)));
        assert!(range.matches(&Value::from(3)));
        assert!(!range.matches(&Value::Bool(true)));

        let one_of: RuleCondition = serde_json::from_str("[1, 2]").unwrap();
        assert!(one_of.matches(&Value::from(2.0)));
        assert!(!one_of.matches(&Value::from(3)));

        let exact: RuleCondition = serde_json::from_str("true").unwrap();
        assert!(exact.matches(&Value::Bool(true)));

        let parsed: RuleCondition = serde_json::from_str(r#"{"gte": 2}"#).unwrap();
        assert!(matches!(parsed, RuleCondition::Range(_)));
    }

    #[test]
    fn malformed_tables_are_rejected() {
        let empty = RuleTable { rules: Vec::new() };
        assert_eq!(AnalysisAdaptor::new(empty).unwrap_err(), ConfigError::EmptyRuleTable);

        let no_fallback = RuleTable::from_json(
            r#"{"analysis_types": [{"id": "a", "name": "A", "when": {"node_count": 1}, "runner": "path"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            AnalysisAdaptor::new(no_fallback),
            Err(ConfigError::MissingFallback(_))
        ));

        let early_fallback = RuleTable::from_json(
            r#"{"analysis_types": [
                {"id": "a", "name": "A", "when": {}, "runner": "path"},
                {"id": "b", "name": "B", "when": {}, "runner": "path"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            AnalysisAdaptor::new(early_fallback).unwrap_err(),
            ConfigError::FallbackNotLast("a".to_string())
        );

        let duplicate = RuleTable::from_json(
            r#"{"analysis_types": [
                {"id": "a", "name": "A", "when": {"node_count": 1}, "runner": "path"},
                {"id": "a", "name": "A", "when": {}, "runner": "path"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            AnalysisAdaptor::new(duplicate).unwrap_err(),
            ConfigError::DuplicateRule("a".to_string())
        );

        let unknown_runner = RuleTable::from_json(
            r#"{"analysis_types": [{"id": "a", "name": "A", "when": {}, "runner": "magic"}]}"#,
        );
        assert!(matches!(unknown_runner, Err(ConfigError::Invalid(_))));
    }
}
