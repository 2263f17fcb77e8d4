//! Closure constraints.
//!
//! A delivery within the proximity radius of any reported closure is removed
//! from the feasible set for the current solve. This is a hard exclusion,
//! not a cost penalty.

use std::collections::BTreeSet;

use tracing::debug;

use crate::geo;
use crate::model::{Closure, Coordinate};

/// Proximity radius around a closure, in meters.
pub const DEFAULT_CLOSURE_RADIUS_M: f64 = 1000.0;

/// Indices of `locations` that lie within `radius_m` of any closure.
pub fn excluded_indices(
    locations: &[Coordinate],
    closures: &[Closure],
    radius_m: f64,
) -> BTreeSet<usize> {
    if closures.is_empty() {
        return BTreeSet::new();
    }

    let excluded: BTreeSet<usize> = locations
        .iter()
        .enumerate()
        .filter(|(_, location)| {
            closures
                .iter()
                .any(|closure| geo::distance_meters(**location, closure.location) <= radius_m)
        })
        .map(|(index, _)| index)
        .collect();

    if !excluded.is_empty() {
        debug!(
            excluded = excluded.len(),
            closures = closures.len(),
            "closure constraints excluded deliveries"
        );
    }

    excluded
}
