//! Sequencer configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::budget::DEFAULT_BUDGET_MS;
use crate::closure::DEFAULT_CLOSURE_RADIUS_M;
use crate::solver::SolveOptions;
use crate::time_window::DEFAULT_BUFFER_MINUTES;

/// Configuration for the [`Sequencer`](crate::engine::Sequencer).
///
/// Deserializes from camelCase keys; anything missing takes its default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SequencerConfig {
    /// Slack on either side of a scheduled time, in minutes.
    pub buffer_minutes: i64,
    /// Deliveries this close to a closure are excluded, in meters.
    pub closure_radius_meters: f64,
    /// Wall-clock budget for one solve, in milliseconds.
    pub solve_budget_ms: u64,
    /// Largest free working set solved by exhaustive search.
    pub exact_search_limit: usize,
    /// Maximum iterations for local search improvement.
    pub local_search_iterations: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        let solver = SolveOptions::default();
        Self {
            buffer_minutes: DEFAULT_BUFFER_MINUTES,
            closure_radius_meters: DEFAULT_CLOSURE_RADIUS_M,
            solve_budget_ms: DEFAULT_BUDGET_MS,
            exact_search_limit: solver.exact_search_limit,
            local_search_iterations: solver.local_search_iterations,
        }
    }
}

impl SequencerConfig {
    pub fn solve_budget(&self) -> Duration {
        Duration::from_millis(self.solve_budget_ms)
    }

    pub fn solve_options(&self) -> SolveOptions {
        SolveOptions {
            exact_search_limit: self.exact_search_limit,
            local_search_iterations: self.local_search_iterations,
        }
    }
}
