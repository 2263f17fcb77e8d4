//! Sequencing pipeline exposed to callers.
//!
//! Validation, closure exclusion, matrix construction, window derivation and
//! the solve itself run here in that order. Callers persist and broadcast the
//! result; nothing in this module touches shared state.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::budget::{CancelToken, SolveBudget};
use crate::closure;
use crate::config::SequencerConfig;
use crate::error::{InvalidInput, SequencingError, SolveFailure};
use crate::geo;
use crate::matrix::{CostScaling, HaversineMatrix};
use crate::model::{Closure, Conditions, Coordinate, Delivery, DeliveryId, DeliveryStatus, Route};
use crate::solver::{self, SequencingProblem};
use crate::time_window;
use crate::traits::{ConditionsSource, DistanceMatrixProvider};

/// Extra time a background wait allows past the solve budget before it
/// cancels, so a solve finishing right at its deadline is not discarded.
const WAIT_GRACE: Duration = Duration::from_millis(100);

/// Constraint relaxation requested for a retry after a failed solve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Relaxation {
    /// Minutes added to the window buffer.
    pub extra_buffer_minutes: i64,
    /// Ignore the most recently reported closure.
    pub drop_latest_closure: bool,
}

/// Result of sequencing a new route.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequenced {
    pub order: Vec<Delivery>,
    /// Deliveries left out of the order; they stay pending on the route.
    pub unscheduled: Vec<DeliveryId>,
    pub total_cost: i64,
}

/// Result of a reoptimization. Always carries a usable order.
#[derive(Debug, Clone, PartialEq)]
pub struct Reoptimized {
    /// New order on success; the prior working-set order on failure.
    pub order: Vec<Delivery>,
    pub unscheduled: Vec<DeliveryId>,
    pub failure: Option<SolveFailure>,
    pub total_cost: Option<i64>,
    /// Travel-cost improvement over the prior order, in percent.
    pub optimization_score: Option<f64>,
}

impl Reoptimized {
    fn fallback(previous: Vec<Delivery>, failure: SolveFailure) -> Self {
        Self {
            order: previous,
            unscheduled: Vec::new(),
            failure: Some(failure),
            total_cost: None,
            optimization_score: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// What the pipeline needs beyond the working set.
struct PlanRequest<'a> {
    depot: Option<Coordinate>,
    scaling: CostScaling,
    closures: &'a [Closure],
    buffer_minutes: i64,
    fixed_prefix: Vec<usize>,
}

/// Working-set indices produced by the pipeline.
struct Plan {
    order: Vec<usize>,
    unscheduled: Vec<usize>,
    total_cost: i64,
    baseline_cost: i64,
}

impl Plan {
    fn optimization_score(&self) -> f64 {
        if self.baseline_cost <= 0 {
            return 0.0;
        }
        let saved = (self.baseline_cost - self.total_cost) as f64;
        (saved / self.baseline_cost as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Route sequencing engine.
///
/// Holds configuration and a matrix provider; every call is independent, so
/// one `Sequencer` can serve many routes concurrently.
#[derive(Debug, Clone)]
pub struct Sequencer<M = HaversineMatrix> {
    config: SequencerConfig,
    matrix_provider: M,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new(SequencerConfig::default())
    }
}

impl Sequencer {
    pub fn new(config: SequencerConfig) -> Self {
        Self::with_provider(config, HaversineMatrix::default())
    }
}

impl<M: DistanceMatrixProvider> Sequencer<M> {
    pub fn with_provider(config: SequencerConfig, matrix_provider: M) -> Self {
        Self {
            config,
            matrix_provider,
        }
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn provider(&self) -> &M {
        &self.matrix_provider
    }

    /// Order the deliveries of a freshly created route.
    ///
    /// Uses unscaled travel time and no closures. `origin` is the vehicle's
    /// start; without one the earliest-scheduled delivery's location is used.
    pub fn sequence_new_route(
        &self,
        deliveries: &[Delivery],
        origin: Option<Coordinate>,
    ) -> Result<Sequenced, SequencingError> {
        let working: Vec<&Delivery> = deliveries
            .iter()
            .filter(|delivery| delivery.status.is_schedulable())
            .collect();
        let budget = SolveBudget::new(self.config.solve_budget());
        let request = PlanRequest {
            depot: origin,
            scaling: CostScaling::Raw,
            closures: &[],
            buffer_minutes: self.config.buffer_minutes,
            fixed_prefix: Vec::new(),
        };

        let plan = self.plan(&working, request, &budget)?;
        Ok(Sequenced {
            order: plan.order.iter().map(|&i| working[i].clone()).collect(),
            unscheduled: plan.unscheduled.iter().map(|&i| working[i].id.clone()).collect(),
            total_cost: plan.total_cost,
        })
    }

    /// Reorder the remaining stops of a route under live conditions.
    ///
    /// Only `InvalidInput` is returned as an error. Infeasible or timed-out
    /// solves come back as a [`Reoptimized`] holding the unchanged order.
    pub fn reoptimize(
        &self,
        route: &Route,
        conditions: &Conditions,
    ) -> Result<Reoptimized, SequencingError> {
        let budget = SolveBudget::new(self.config.solve_budget());
        self.reoptimize_with(route, conditions, Relaxation::default(), &budget)
    }

    /// Reoptimize using conditions fetched from `source`.
    pub fn reoptimize_from<S: ConditionsSource>(
        &self,
        route: &Route,
        source: &S,
    ) -> Result<Reoptimized, SequencingError> {
        let conditions = source.conditions_for(&route.id);
        self.reoptimize(route, &conditions)
    }

    pub fn reoptimize_with(
        &self,
        route: &Route,
        conditions: &Conditions,
        relaxation: Relaxation,
        budget: &SolveBudget,
    ) -> Result<Reoptimized, SequencingError> {
        let started_at = Instant::now();
        let working = route.working_set();
        let previous: Vec<Delivery> = working.iter().map(|&delivery| delivery.clone()).collect();

        let closures = if relaxation.drop_latest_closure {
            &conditions.closures[..conditions.closures.len().saturating_sub(1)]
        } else {
            &conditions.closures[..]
        };
        let fixed_prefix = working
            .iter()
            .enumerate()
            .filter(|(_, delivery)| delivery.status == DeliveryStatus::InTransit)
            .map(|(index, _)| index)
            .collect();
        let request = PlanRequest {
            depot: conditions.vehicle_position,
            scaling: CostScaling::traffic(conditions.traffic_factor)?,
            closures,
            buffer_minutes: self
                .config
                .buffer_minutes
                .saturating_add(relaxation.extra_buffer_minutes.max(0)),
            fixed_prefix,
        };

        match self.plan(&working, request, budget) {
            Ok(plan) => {
                info!(
                    route = %route.id,
                    stops = plan.order.len(),
                    unscheduled = plan.unscheduled.len(),
                    cost = plan.total_cost,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "route reoptimized"
                );
                Ok(Reoptimized {
                    order: plan.order.iter().map(|&i| working[i].clone()).collect(),
                    unscheduled: plan.unscheduled.iter().map(|&i| working[i].id.clone()).collect(),
                    failure: None,
                    total_cost: Some(plan.total_cost),
                    optimization_score: Some(plan.optimization_score()),
                })
            }
            Err(err @ SequencingError::InvalidInput(_)) => Err(err),
            Err(SequencingError::Infeasible) => {
                warn!(route = %route.id, "reoptimization infeasible, keeping previous order");
                Ok(Reoptimized::fallback(previous, SolveFailure::Infeasible))
            }
            Err(SequencingError::Timeout) => {
                warn!(route = %route.id, "reoptimization timed out, keeping previous order");
                Ok(Reoptimized::fallback(previous, SolveFailure::Timeout))
            }
        }
    }

    /// Reoptimize independent routes in parallel.
    pub fn reoptimize_all(
        &self,
        jobs: &[(Route, Conditions)],
    ) -> Vec<Result<Reoptimized, SequencingError>>
    where
        M: Sync,
    {
        jobs.par_iter()
            .map(|(route, conditions)| self.reoptimize(route, conditions))
            .collect()
    }

    fn plan(
        &self,
        working: &[&Delivery],
        request: PlanRequest<'_>,
        budget: &SolveBudget,
    ) -> Result<Plan, SequencingError> {
        let scheduled = validate(working, request.closures, request.depot)?;

        let locations: Vec<Coordinate> = working.iter().map(|delivery| delivery.location).collect();
        let excluded = closure::excluded_indices(
            &locations,
            request.closures,
            self.config.closure_radius_meters,
        );
        let feasible: Vec<usize> = (0..working.len()).filter(|i| !excluded.contains(i)).collect();
        let unscheduled: Vec<usize> = excluded.iter().copied().collect();

        if feasible.len() <= 1 {
            debug!(stops = feasible.len(), "trivial working set, skipping solve");
            return Ok(Plan {
                order: feasible,
                unscheduled,
                total_cost: 0,
                baseline_cost: 0,
            });
        }

        let depot = request
            .depot
            .unwrap_or_else(|| earliest_location(working, &scheduled));
        let mut matrix_locations = Vec::with_capacity(locations.len() + 1);
        matrix_locations.push(depot);
        matrix_locations.extend_from_slice(&locations);

        let matrix = self.matrix_provider.matrix_for(&matrix_locations, request.scaling);
        let windows = time_window::derive_windows(&scheduled, request.buffer_minutes);

        let problem = SequencingProblem {
            matrix: &matrix,
            windows: &windows,
            excluded: &excluded,
            fixed_prefix: &request.fixed_prefix,
        };
        let solution = solver::solve(&problem, &self.config.solve_options(), budget)?;

        Ok(Plan {
            baseline_cost: solver::order_cost(&matrix, &feasible),
            order: solution.order,
            unscheduled,
            total_cost: solution.total_cost,
        })
    }
}

impl<M> Sequencer<M>
where
    M: DistanceMatrixProvider + Send + Sync + 'static,
{
    /// Run a reoptimization on the rayon pool, off the calling thread.
    pub fn spawn_reoptimize(self: &Arc<Self>, route: Route, conditions: Conditions) -> SolveHandle {
        let limit = self.config.solve_budget();
        let token = CancelToken::new();
        let budget = SolveBudget::with_token(limit, token.clone());
        let previous: Vec<Delivery> = route.working_set().into_iter().cloned().collect();
        let (sender, receiver) = mpsc::channel();

        let engine = Arc::clone(self);
        rayon::spawn(move || {
            let result = engine.reoptimize_with(&route, &conditions, Relaxation::default(), &budget);
            // The handle may already have given up.
            let _ = sender.send(result);
        });

        SolveHandle {
            receiver,
            token,
            previous,
            wait_limit: limit + WAIT_GRACE,
        }
    }
}

/// A background solve. Dropping the handle does not stop the solve; call
/// [`SolveHandle::cancel`] for that.
#[derive(Debug)]
pub struct SolveHandle {
    receiver: mpsc::Receiver<Result<Reoptimized, SequencingError>>,
    token: CancelToken,
    previous: Vec<Delivery>,
    wait_limit: Duration,
}

impl SolveHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Block until the solve finishes or its budget runs out.
    ///
    /// On expiry the solve is cancelled and the previous order is returned
    /// with a `Timeout` failure.
    pub fn wait(self) -> Result<Reoptimized, SequencingError> {
        match self.receiver.recv_timeout(self.wait_limit) {
            Ok(result) => result,
            Err(_) => {
                self.token.cancel();
                warn!(
                    waited_ms = self.wait_limit.as_millis() as u64,
                    "background solve exceeded its budget, keeping previous order"
                );
                Ok(Reoptimized::fallback(self.previous, SolveFailure::Timeout))
            }
        }
    }
}

/// Check the working set and closures; returns the scheduled times.
fn validate(
    working: &[&Delivery],
    closures: &[Closure],
    depot: Option<Coordinate>,
) -> Result<Vec<i64>, InvalidInput> {
    let mut seen = HashSet::with_capacity(working.len());
    let mut scheduled = Vec::with_capacity(working.len());

    for delivery in working {
        if !seen.insert(&delivery.id) {
            return Err(InvalidInput::DuplicateDelivery(delivery.id.clone()));
        }
        geo::validate(delivery.location)?;
        let time = delivery
            .scheduled_time
            .ok_or_else(|| InvalidInput::MissingScheduledTime(delivery.id.clone()))?;
        scheduled.push(time);
    }
    for closure in closures {
        geo::validate(closure.location)?;
    }
    if let Some(depot) = depot {
        geo::validate(depot)?;
    }

    Ok(scheduled)
}

/// Location of the earliest-scheduled delivery; ties go to the first listed.
fn earliest_location(working: &[&Delivery], scheduled: &[i64]) -> Coordinate {
    scheduled
        .iter()
        .enumerate()
        .min_by_key(|&(index, &time)| (time, index))
        .map(|(index, _)| working[index].location)
        .unwrap_or(Coordinate::new(0.0, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RouteId;

    fn delivery(id: &str, lat: f64, scheduled: Option<i64>) -> Delivery {
        Delivery {
            id: DeliveryId::new(id),
            route_id: RouteId::new("r1"),
            status: DeliveryStatus::Pending,
            location: Coordinate::new(lat, -115.0),
            scheduled_time: scheduled,
            completed_time: None,
            proof: None,
        }
    }

    #[test]
    fn test_validate_rejects_missing_time() {
        let a = delivery("a", 36.0, None);
        let err = validate(&[&a], &[], None).unwrap_err();
        assert_eq!(err, InvalidInput::MissingScheduledTime(DeliveryId::new("a")));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let a = delivery("a", 36.0, Some(0));
        let err = validate(&[&a, &a], &[], None).unwrap_err();
        assert_eq!(err, InvalidInput::DuplicateDelivery(DeliveryId::new("a")));
    }

    #[test]
    fn test_validate_rejects_bad_closure() {
        let a = delivery("a", 36.0, Some(0));
        let err = validate(&[&a], &[Closure::at(95.0, 0.0)], None).unwrap_err();
        assert!(matches!(err, InvalidInput::CoordinateOutOfRange { .. }));
    }

    #[test]
    fn test_earliest_location_prefers_first_on_tie() {
        let a = delivery("a", 36.0, Some(100));
        let b = delivery("b", 36.1, Some(50));
        let c = delivery("c", 36.2, Some(50));
        let location = earliest_location(&[&a, &b, &c], &[100, 50, 50]);
        assert_eq!(location, b.location);
    }

    #[test]
    fn test_optimization_score() {
        let plan = Plan {
            order: Vec::new(),
            unscheduled: Vec::new(),
            total_cost: 75,
            baseline_cost: 100,
        };
        assert_eq!(plan.optimization_score(), 25.0);

        let worse = Plan {
            total_cost: 120,
            ..plan
        };
        assert_eq!(worse.optimization_score(), 0.0);
    }
}
