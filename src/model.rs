//! Route and delivery data model.
//!
//! These types mirror what the persistence layer hands us. The engine treats
//! them as an immutable snapshot for the duration of one solve; the only
//! mutation it offers is [`Route::apply`], which reorders deliveries in place.

use serde::{Deserialize, Serialize};

use crate::engine::Reoptimized;

/// A point on the earth's surface in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(pub String);

impl DeliveryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(pub String);

impl RouteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RouteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InTransit,
    Delivered,
    Failed,
    Cancelled,
}

impl DeliveryStatus {
    /// Whether a delivery in this status may be reordered by a solve.
    pub fn is_schedulable(self) -> bool {
        matches!(self, DeliveryStatus::Pending | DeliveryStatus::InTransit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl RouteStatus {
    /// Routes that can still be reordered.
    pub fn is_active(self) -> bool {
        matches!(self, RouteStatus::Pending | RouteStatus::InProgress)
    }
}

/// Opaque proof captured by the driver app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofOfDelivery {
    pub reference: String,
    pub captured_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: DeliveryId,
    pub route_id: RouteId,
    pub status: DeliveryStatus,
    pub location: Coordinate,
    /// Scheduled arrival (unix timestamp, seconds).
    pub scheduled_time: Option<i64>,
    pub completed_time: Option<i64>,
    pub proof: Option<ProofOfDelivery>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: RouteId,
    pub vehicle_id: String,
    pub driver_id: String,
    pub deliveries: Vec<Delivery>,
    pub status: RouteStatus,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub optimization_score: Option<f64>,
}

impl Route {
    /// Deliveries eligible for reordering, in current route order.
    pub fn working_set(&self) -> Vec<&Delivery> {
        self.deliveries
            .iter()
            .filter(|delivery| delivery.status.is_schedulable())
            .collect()
    }

    pub fn delivery(&self, id: &DeliveryId) -> Option<&Delivery> {
        self.deliveries.iter().find(|delivery| &delivery.id == id)
    }

    /// Replace the delivery order with a reoptimization result.
    ///
    /// Delivered stops stay at the front, the new order follows, and every
    /// other delivery keeps its relative position at the tail. Does nothing
    /// when the outcome carries a failure. Returns whether the route changed.
    pub fn apply(&mut self, outcome: &Reoptimized) -> bool {
        if outcome.failure.is_some() {
            return false;
        }

        let mut remaining = std::mem::take(&mut self.deliveries);
        let mut reordered = Vec::with_capacity(remaining.len());

        let (delivered, rest): (Vec<_>, Vec<_>) = remaining
            .drain(..)
            .partition(|delivery| delivery.status == DeliveryStatus::Delivered);
        reordered.extend(delivered);

        let mut rest: Vec<Option<Delivery>> = rest.into_iter().map(Some).collect();
        for scheduled in &outcome.order {
            let slot = rest
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|d| d.id == scheduled.id));
            if let Some(delivery) = slot.and_then(Option::take) {
                reordered.push(delivery);
            }
        }
        reordered.extend(rest.into_iter().flatten());

        self.deliveries = reordered;
        self.optimization_score = outcome.optimization_score;
        true
    }
}

/// A reported road closure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Closure {
    pub location: Coordinate,
}

impl Closure {
    pub const fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            location: Coordinate::new(latitude, longitude),
        }
    }
}

pub const DEFAULT_TRAFFIC_FACTOR: f64 = 1.2;

/// Live conditions for a route, as supplied by the conditions feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Conditions {
    pub traffic_factor: f64,
    pub closures: Vec<Closure>,
    /// Current vehicle position; used as the depot when present.
    pub vehicle_position: Option<Coordinate>,
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            traffic_factor: DEFAULT_TRAFFIC_FACTOR,
            closures: Vec::new(),
            vehicle_position: None,
        }
    }
}
