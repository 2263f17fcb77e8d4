//! Reoptimization trigger policy.
//!
//! Each route moves through `Stable -> PendingReopt -> Reoptimizing ->
//! Reconciled -> Stable`. A failed solve drops back to `PendingReopt` with
//! the previous order kept. Triggers arriving while a solve is in flight are
//! coalesced: the latest inputs win and the running result is discarded.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::budget::SolveBudget;
use crate::engine::{Relaxation, Reoptimized, Sequencer};
use crate::error::{SequencingError, SolveFailure};
use crate::model::{Conditions, DeliveryId, DeliveryStatus, Route, RouteId, RouteStatus};
use crate::traits::DistanceMatrixProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReoptState {
    Stable,
    PendingReopt,
    Reoptimizing,
    Reconciled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerEvent {
    StatusChanged {
        delivery_id: DeliveryId,
        new_status: DeliveryStatus,
    },
    ConditionsUpdated(Conditions),
    /// Explicit retry, optionally with relaxed constraints.
    ManualRequest(Relaxation),
}

/// Inputs for the solve a trigger just started.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveTicket {
    pub conditions: Conditions,
    pub relaxation: Relaxation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// New order ready to persist; acknowledge once written.
    Reconciled(Reoptimized),
    /// Solve failed; the previous order stands and a retry may follow.
    Retained(SolveFailure),
    /// A newer trigger arrived mid-solve; the result was discarded.
    Superseded,
}

/// Trigger state for a single route.
#[derive(Debug, Clone)]
pub struct RouteTrigger {
    state: ReoptState,
    conditions: Conditions,
    relaxation: Relaxation,
    rerun: bool,
}

impl Default for RouteTrigger {
    fn default() -> Self {
        Self::new(Conditions::default())
    }
}

impl RouteTrigger {
    pub fn new(conditions: Conditions) -> Self {
        Self {
            state: ReoptState::Stable,
            conditions,
            relaxation: Relaxation::default(),
            rerun: false,
        }
    }

    pub fn state(&self) -> ReoptState {
        self.state
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    /// Record an event. Returns true if a solve is now owed for the route.
    ///
    /// Conditions are stored even when they do not warrant a solve, so the
    /// next solve sees the latest values.
    pub fn notify(&mut self, event: TriggerEvent, route_status: RouteStatus) -> bool {
        let active = route_status.is_active();
        let warranted = match &event {
            TriggerEvent::StatusChanged { new_status, .. } => {
                active && matches!(new_status, DeliveryStatus::Cancelled | DeliveryStatus::Failed)
            }
            TriggerEvent::ConditionsUpdated(_) => route_status == RouteStatus::InProgress,
            TriggerEvent::ManualRequest(_) => active,
        };

        match event {
            TriggerEvent::ConditionsUpdated(conditions) => self.conditions = conditions,
            TriggerEvent::ManualRequest(relaxation) if warranted => self.relaxation = relaxation,
            _ => {}
        }

        if !warranted {
            return false;
        }

        match self.state {
            ReoptState::Reoptimizing => {
                debug!("trigger coalesced into in-flight solve");
                self.rerun = true;
            }
            ReoptState::Stable | ReoptState::PendingReopt | ReoptState::Reconciled => {
                self.state = ReoptState::PendingReopt;
            }
        }
        true
    }

    /// Start a solve if one is owed and none is running.
    pub fn begin(&mut self) -> Option<SolveTicket> {
        if self.state != ReoptState::PendingReopt {
            return None;
        }
        self.state = ReoptState::Reoptimizing;
        self.rerun = false;
        Some(SolveTicket {
            conditions: self.conditions.clone(),
            relaxation: std::mem::take(&mut self.relaxation),
        })
    }

    /// Record the outcome of the running solve.
    pub fn finish(&mut self, outcome: Reoptimized) -> Completion {
        if self.state != ReoptState::Reoptimizing {
            warn!(state = ?self.state, "solve finished without being started");
            return Completion::Superseded;
        }

        if std::mem::take(&mut self.rerun) {
            self.state = ReoptState::PendingReopt;
            return Completion::Superseded;
        }

        match outcome.failure {
            Some(failure) => {
                self.state = ReoptState::PendingReopt;
                Completion::Retained(failure)
            }
            None => {
                self.state = ReoptState::Reconciled;
                Completion::Reconciled(outcome)
            }
        }
    }

    /// Abandon the running solve after rejected input.
    pub fn abort(&mut self) {
        if self.state == ReoptState::Reoptimizing {
            self.state = if std::mem::take(&mut self.rerun) {
                ReoptState::PendingReopt
            } else {
                ReoptState::Stable
            };
        }
    }

    /// The caller has persisted the reconciled order.
    pub fn acknowledge(&mut self) -> bool {
        if self.state == ReoptState::Reconciled {
            self.state = ReoptState::Stable;
            true
        } else {
            false
        }
    }
}

/// Trigger state for many routes, at most one in-flight solve each.
#[derive(Debug, Default)]
pub struct ReoptimizationCoordinator {
    triggers: Mutex<HashMap<RouteId, RouteTrigger>>,
}

impl ReoptimizationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event for `route`. Returns true if a solve is now owed.
    ///
    /// Routes are tracked only once an event matters to them. Events for a
    /// finished route drop its entry unless a solve is still running.
    pub fn notify(&self, route: &Route, event: TriggerEvent) -> bool {
        if let TriggerEvent::StatusChanged { delivery_id, .. } = &event {
            if route.delivery(delivery_id).is_none() {
                debug!(route = %route.id, delivery = %delivery_id, "status event for unknown delivery");
                return false;
            }
        }

        let mut triggers = self.triggers.lock();
        if !route.status.is_active() {
            let idle = triggers
                .get(&route.id)
                .is_some_and(|trigger| trigger.state() != ReoptState::Reoptimizing);
            if idle {
                triggers.remove(&route.id);
                debug!(route = %route.id, "route finished, trigger dropped");
            }
            return false;
        }

        let keeps_inputs = matches!(event, TriggerEvent::ConditionsUpdated(_));
        let (pending, state) = match triggers.entry(route.id.clone()) {
            Entry::Occupied(entry) => {
                let trigger = entry.into_mut();
                (trigger.notify(event, route.status), trigger.state())
            }
            Entry::Vacant(entry) => {
                let mut trigger = RouteTrigger::default();
                let pending = trigger.notify(event, route.status);
                let state = trigger.state();
                if pending || keeps_inputs {
                    entry.insert(trigger);
                }
                (pending, state)
            }
        };
        debug!(route = %route.id, state = ?state, pending, "trigger event");
        pending
    }

    /// Stop tracking a route. A running solve's result will be discarded.
    pub fn forget(&self, route_id: &RouteId) -> bool {
        self.triggers.lock().remove(route_id).is_some()
    }

    /// Number of routes currently tracked.
    pub fn tracked(&self) -> usize {
        self.triggers.lock().len()
    }

    pub fn state(&self, route_id: &RouteId) -> ReoptState {
        self.triggers
            .lock()
            .get(route_id)
            .map_or(ReoptState::Stable, RouteTrigger::state)
    }

    pub fn begin(&self, route_id: &RouteId) -> Option<SolveTicket> {
        self.triggers.lock().get_mut(route_id)?.begin()
    }

    pub fn finish(&self, route_id: &RouteId, outcome: Reoptimized) -> Completion {
        match self.triggers.lock().get_mut(route_id) {
            Some(trigger) => trigger.finish(outcome),
            None => Completion::Superseded,
        }
    }

    pub fn acknowledge(&self, route_id: &RouteId) -> bool {
        self.triggers
            .lock()
            .get_mut(route_id)
            .is_some_and(RouteTrigger::acknowledge)
    }

    /// Drive one pending solve for `route` to completion.
    ///
    /// Returns `None` when nothing is owed or a solve is already running.
    /// The lock is not held while solving.
    pub fn run<M: DistanceMatrixProvider>(
        &self,
        sequencer: &Sequencer<M>,
        route: &Route,
    ) -> Option<Result<Completion, SequencingError>> {
        let ticket = self.begin(&route.id)?;
        let budget = SolveBudget::new(sequencer.config().solve_budget());

        match sequencer.reoptimize_with(route, &ticket.conditions, ticket.relaxation, &budget) {
            Ok(outcome) => Some(Ok(self.finish(&route.id, outcome))),
            Err(err) => {
                warn!(route = %route.id, error = %err, "reoptimization rejected");
                if let Some(trigger) = self.triggers.lock().get_mut(&route.id) {
                    trigger.abort();
                }
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancelled() -> TriggerEvent {
        TriggerEvent::StatusChanged {
            delivery_id: DeliveryId::new("d1"),
            new_status: DeliveryStatus::Cancelled,
        }
    }

    fn success() -> Reoptimized {
        Reoptimized {
            order: Vec::new(),
            unscheduled: Vec::new(),
            failure: None,
            total_cost: Some(0),
            optimization_score: Some(0.0),
        }
    }

    fn failed(failure: SolveFailure) -> Reoptimized {
        Reoptimized {
            failure: Some(failure),
            total_cost: None,
            optimization_score: None,
            ..success()
        }
    }

    #[test]
    fn test_full_cycle() {
        let mut trigger = RouteTrigger::default();
        assert!(trigger.notify(cancelled(), RouteStatus::InProgress));
        assert_eq!(trigger.state(), ReoptState::PendingReopt);

        assert!(trigger.begin().is_some());
        assert_eq!(trigger.state(), ReoptState::Reoptimizing);

        assert!(matches!(trigger.finish(success()), Completion::Reconciled(_)));
        assert_eq!(trigger.state(), ReoptState::Reconciled);

        assert!(trigger.acknowledge());
        assert_eq!(trigger.state(), ReoptState::Stable);
    }

    #[test]
    fn test_irrelevant_status_does_not_trigger() {
        let mut trigger = RouteTrigger::default();
        let delivered = TriggerEvent::StatusChanged {
            delivery_id: DeliveryId::new("d1"),
            new_status: DeliveryStatus::Delivered,
        };
        assert!(!trigger.notify(delivered, RouteStatus::InProgress));
        assert_eq!(trigger.state(), ReoptState::Stable);
    }

    #[test]
    fn test_failed_delivery_triggers() {
        let mut trigger = RouteTrigger::default();
        let failed = TriggerEvent::StatusChanged {
            delivery_id: DeliveryId::new("d1"),
            new_status: DeliveryStatus::Failed,
        };
        assert!(trigger.notify(failed, RouteStatus::Pending));
    }

    #[test]
    fn test_conditions_only_trigger_in_progress() {
        let mut trigger = RouteTrigger::default();
        let update = Conditions {
            traffic_factor: 1.8,
            ..Conditions::default()
        };

        assert!(!trigger.notify(TriggerEvent::ConditionsUpdated(update.clone()), RouteStatus::Pending));
        assert_eq!(trigger.state(), ReoptState::Stable);
        // Stored anyway for the next solve.
        assert_eq!(trigger.conditions().traffic_factor, 1.8);

        assert!(trigger.notify(TriggerEvent::ConditionsUpdated(update), RouteStatus::InProgress));
        assert_eq!(trigger.state(), ReoptState::PendingReopt);
    }

    #[test]
    fn test_finished_route_never_triggers() {
        let mut trigger = RouteTrigger::default();
        assert!(!trigger.notify(cancelled(), RouteStatus::Completed));
        assert!(!trigger.notify(TriggerEvent::ManualRequest(Relaxation::default()), RouteStatus::Cancelled));
        assert_eq!(trigger.state(), ReoptState::Stable);
    }

    #[test]
    fn test_failure_returns_to_pending_and_retries_relaxed() {
        let mut trigger = RouteTrigger::default();
        trigger.notify(cancelled(), RouteStatus::InProgress);
        trigger.begin();

        assert_eq!(
            trigger.finish(failed(SolveFailure::Infeasible)),
            Completion::Retained(SolveFailure::Infeasible)
        );
        assert_eq!(trigger.state(), ReoptState::PendingReopt);

        let relax = Relaxation {
            extra_buffer_minutes: 10,
            drop_latest_closure: true,
        };
        assert!(trigger.notify(TriggerEvent::ManualRequest(relax), RouteStatus::InProgress));
        let ticket = trigger.begin().expect("retry should start");
        assert_eq!(ticket.relaxation, relax);

        // Relaxation applies to one solve only.
        trigger.finish(failed(SolveFailure::Timeout));
        trigger.notify(cancelled(), RouteStatus::InProgress);
        assert_eq!(trigger.begin().unwrap().relaxation, Relaxation::default());
    }

    #[test]
    fn test_trigger_during_solve_is_coalesced() {
        let mut trigger = RouteTrigger::default();
        trigger.notify(cancelled(), RouteStatus::InProgress);
        let first = trigger.begin().unwrap();
        assert_eq!(first.conditions.traffic_factor, 1.2);

        let slow = Conditions {
            traffic_factor: 1.5,
            ..Conditions::default()
        };
        let fastest = Conditions {
            traffic_factor: 1.3,
            ..Conditions::default()
        };
        assert!(trigger.notify(TriggerEvent::ConditionsUpdated(slow), RouteStatus::InProgress));
        assert!(trigger.notify(TriggerEvent::ConditionsUpdated(fastest), RouteStatus::InProgress));
        assert_eq!(trigger.state(), ReoptState::Reoptimizing);
        assert!(trigger.begin().is_none(), "only one solve in flight");

        assert_eq!(trigger.finish(success()), Completion::Superseded);
        assert_eq!(trigger.state(), ReoptState::PendingReopt);

        let next = trigger.begin().unwrap();
        assert_eq!(next.conditions.traffic_factor, 1.3);
    }

    #[test]
    fn test_abort_resets() {
        let mut trigger = RouteTrigger::default();
        trigger.notify(cancelled(), RouteStatus::InProgress);
        trigger.begin();
        trigger.abort();
        assert_eq!(trigger.state(), ReoptState::Stable);
    }

    #[test]
    fn test_acknowledge_only_from_reconciled() {
        let mut trigger = RouteTrigger::default();
        assert!(!trigger.acknowledge());
        trigger.notify(cancelled(), RouteStatus::InProgress);
        assert!(!trigger.acknowledge());
        assert_eq!(trigger.state(), ReoptState::PendingReopt);
    }
}
