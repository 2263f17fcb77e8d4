//! Provider seams for the sequencing engine.
//!
//! The engine only depends on these traits, so callers can swap in a road
//! network matrix or a different conditions source without touching the
//! solver.

use crate::matrix::{CostScaling, DistanceMatrix};
use crate::model::{Conditions, Coordinate, RouteId};

/// Provides a travel-cost matrix for a set of locations.
///
/// The matrix is indexed by the provided location order; index 0 is the depot.
pub trait DistanceMatrixProvider {
    fn matrix_for(&self, locations: &[Coordinate], scaling: CostScaling) -> DistanceMatrix;
}

/// Supplies live conditions for a route.
///
/// Implementations should never fail outright: when the source is
/// unreachable they return [`Conditions::default`].
pub trait ConditionsSource {
    fn conditions_for(&self, route_id: &RouteId) -> Conditions;
}
