//! Travel-cost matrices.
//!
//! Costs are seconds of travel. [`HaversineMatrix`] estimates them from
//! straight-line distance and an assumed speed, optionally scaled by a live
//! traffic factor.

use rayon::prelude::*;

use crate::error::InvalidInput;
use crate::geo;
use crate::model::Coordinate;
use crate::traits::DistanceMatrixProvider;

/// Average driving speed assumption for time estimation.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// How raw travel time is scaled before rounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CostScaling {
    /// Unscaled distance-derived time, used when a route is first sequenced.
    Raw,
    /// Travel time multiplied by a live traffic factor (>= 1.0).
    Traffic(f64),
}

impl CostScaling {
    pub fn traffic(factor: f64) -> Result<Self, InvalidInput> {
        if factor.is_finite() && factor >= 1.0 {
            Ok(CostScaling::Traffic(factor))
        } else {
            Err(InvalidInput::TrafficFactor(factor))
        }
    }

    pub fn factor(self) -> f64 {
        match self {
            CostScaling::Raw => 1.0,
            CostScaling::Traffic(factor) => factor,
        }
    }
}

/// Square table of non-negative travel costs. Index 0 is the depot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistanceMatrix {
    costs: Vec<Vec<i64>>,
}

impl DistanceMatrix {
    /// Wrap precomputed costs. Rows must all have the same length as the
    /// number of rows; the diagonal is forced to zero.
    pub fn from_rows(mut costs: Vec<Vec<i64>>) -> Self {
        let n = costs.len();
        for (i, row) in costs.iter_mut().enumerate() {
            row.resize(n, 0);
            row[i] = 0;
        }
        Self { costs }
    }

    pub fn size(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    #[inline]
    pub fn cost(&self, from: usize, to: usize) -> i64 {
        self.costs[from][to]
    }

    pub fn rows(&self) -> &[Vec<i64>] {
        &self.costs
    }
}

/// Haversine-based matrix provider.
///
/// Less accurate than a road network (ignores roads) but always available.
#[derive(Debug, Clone)]
pub struct HaversineMatrix {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for HaversineMatrix {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineMatrix {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Convert meters to unrounded travel seconds.
    fn meters_to_seconds(&self, meters: f64) -> f64 {
        let hours = meters / 1000.0 / self.speed_kmh;
        hours * 3600.0
    }

    fn leg_cost(&self, from: Coordinate, to: Coordinate, scaling: CostScaling) -> i64 {
        let seconds = self.meters_to_seconds(geo::distance_meters(from, to));
        // f64::round rounds half away from zero.
        (seconds * scaling.factor()).round() as i64
    }
}

impl DistanceMatrixProvider for HaversineMatrix {
    fn matrix_for(&self, locations: &[Coordinate], scaling: CostScaling) -> DistanceMatrix {
        let costs = locations
            .par_iter()
            .enumerate()
            .map(|(i, from)| {
                locations
                    .iter()
                    .enumerate()
                    .map(|(j, to)| {
                        if i == j {
                            0
                        } else {
                            self.leg_cost(*from, *to, scaling)
                        }
                    })
                    .collect::<Vec<i64>>()
            })
            .collect();

        DistanceMatrix { costs }
    }
}
