//! Multi-scenario orchestration
//!
//! Every scenario is validated before any is evaluated, so a bad override
//! fails the whole request. Evaluation fans out on a bounded rayon pool and
//! results come back in request order.

use crate::analysis::AnalysisOutcome;
use crate::error::{AnalysisError, ComputeTimeout};
use crate::graph::FunnelGraph;
use crate::overrides::{ParamOverrides, ResolvedOverrides};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const DEFAULT_SCENARIO_ID: &str = "default";

/// A scenario as supplied in a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParams {
    pub scenario_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub param_overrides: ParamOverrides,
}

impl ScenarioParams {
    pub fn new(scenario_id: impl Into<String>) -> Self {
        ScenarioParams {
            scenario_id: scenario_id.into(),
            name: None,
            param_overrides: ParamOverrides::default(),
        }
    }

    /// Scenario used when a request names none
    pub fn implicit_default() -> Self {
        ScenarioParams {
            name: Some("Default".to_string()),
            ..ScenarioParams::new(DEFAULT_SCENARIO_ID)
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.scenario_id)
    }
}

/// A scenario with its merged overrides resolved against the graph
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedScenario {
    pub scenario_id: String,
    pub name: String,
    pub overrides: ResolvedOverrides,
}

/// Evaluation of one scenario
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioRun {
    pub scenario_id: String,
    pub name: String,
    pub outcome: Result<AnalysisOutcome, ComputeTimeout>,
}

/// Runs one analysis across scenarios
#[derive(Debug, Clone, Copy)]
pub struct ScenarioOrchestrator {
    max_workers: usize,
}

impl ScenarioOrchestrator {
    pub fn new(max_workers: usize) -> Self {
        ScenarioOrchestrator {
            max_workers: max_workers.max(1),
        }
    }

    /// Merges each scenario's overrides with `what_if` and resolves them.
    ///
    /// # Errors
    /// `Validation` if any override of any scenario is invalid.
    pub fn prepare(
        &self,
        graph: &FunnelGraph,
        scenarios: &[ScenarioParams],
        what_if: &ParamOverrides,
    ) -> Result<Vec<PreparedScenario>, AnalysisError> {
        let what_if = what_if.resolve(graph)?;
        let implicit = [ScenarioParams::implicit_default()];
        let scenarios = if scenarios.is_empty() {
            &implicit[..]
        } else {
            scenarios
        };

        scenarios
            .iter()
            .map(|scenario| {
                let overrides = scenario
                    .param_overrides
                    .resolve(graph)
                    .map_err(|err| match err {
                        AnalysisError::Validation(msg) => AnalysisError::Validation(format!(
                            "Scenario '{}': {}",
                            scenario.scenario_id, msg
                        )),
                        other => other,
                    })?
                    .overlay(&what_if);
                Ok(PreparedScenario {
                    scenario_id: scenario.scenario_id.clone(),
                    name: scenario.display_name().to_string(),
                    overrides,
                })
            })
            .collect()
    }

    /// Evaluates every prepared scenario, preserving order.
    pub fn run<F>(&self, scenarios: &[PreparedScenario], evaluate: F) -> Vec<ScenarioRun>
    where
        F: Fn(&ResolvedOverrides) -> Result<AnalysisOutcome, ComputeTimeout> + Sync,
    {
        let workers = scenarios.len().min(self.max_workers).max(1);
        let started = Instant::now();
        log::info!(
            "Evaluating {} scenario(s) on {} worker(s)",
            scenarios.len(),
            workers
        );

        let run_one = |scenario: &PreparedScenario| {
            let outcome = evaluate(&scenario.overrides);
            if let Err(timeout) = &outcome {
                log::warn!("Scenario '{}' aborted: {}", scenario.scenario_id, timeout);
            }
            ScenarioRun {
                scenario_id: scenario.scenario_id.clone(),
                name: scenario.name.clone(),
                outcome,
            }
        };

        let runs: Vec<ScenarioRun> = if workers == 1 {
            scenarios.iter().map(run_one).collect()
        } else {
            match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                Ok(pool) => pool.install(|| scenarios.par_iter().map(run_one).collect()),
                Err(err) => {
                    log::warn!("Scenario pool unavailable ({}), running sequentially", err);
                    scenarios.iter().map(run_one).collect()
                }
            }
        };

        log::info!(
            "Evaluated {} scenario(s) in {:?}",
            runs.len(),
            started.elapsed()
        );
        runs
    }
}
