//! Graph Model Adapter
//!
//! Turns the editor's graph JSON into an immutable [`FunnelGraph`] with
//! resolved identities, probabilities, costs and conditional probabilities.

pub mod condition;
pub mod core;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use condition::{Condition, EvalState};
pub use self::core::{
    CaseBinding, CaseDefinition, CaseVariant, ConditionalProbability, CostUnits, EdgeCost,
    FunnelEdge, FunnelGraph, FunnelNode, Policies, PROBABILITY_EPSILON,
};
pub use types::{
    CaseJson, ConditionalProbabilityJson, CostParam, EdgeJson, EntryJson, FreeEdgePolicy,
    GraphJson, NodeJson, OverflowPolicy, PoliciesJson, ProbabilityParam, VariantJson,
};
