//! Great-circle distance.

use crate::error::InvalidInput;
use crate::model::Coordinate;

/// Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two coordinates in meters.
///
/// Symmetric, and exactly zero for identical points. Range checking is the
/// caller's job; see [`validate`].
pub fn distance_meters(from: Coordinate, to: Coordinate) -> f64 {
    // Canonical argument order keeps the result bit-identical both ways.
    let (from, to) = if (from.latitude, from.longitude) <= (to.latitude, to.longitude) {
        (from, to)
    } else {
        (to, from)
    };

    let lat1_rad = from.latitude.to_radians();
    let lat2_rad = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lng = (to.longitude - from.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Reject non-finite or out-of-range coordinates.
pub fn validate(coordinate: Coordinate) -> Result<(), InvalidInput> {
    let Coordinate {
        latitude,
        longitude,
    } = coordinate;
    let in_range = latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude);

    if in_range {
        Ok(())
    } else {
        Err(InvalidInput::CoordinateOutOfRange {
            latitude,
            longitude,
        })
    }
}
