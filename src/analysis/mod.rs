//! Analysis Type Adaptor
//!
//! Maps selection predicates to an analysis through an ordered rule table
//! and provides the runners those analyses dispatch to.

pub mod rules;
pub mod runners;

pub use rules::{
    AnalysisAdaptor, AnalysisDefinition, RangeCondition, RuleCondition, RuleTable, RunnerKind,
};
pub use runners::{
    AnalysisOutcome, AnalysisRunner, BreakdownEntry, DimensionKind, PlanContext, RunPlan,
    RunnerRegistry,
};
