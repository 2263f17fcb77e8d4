//! Test fixtures for delivery-sequencer.
//!
//! Provides:
//! - Coordinates laid out along a north-south line from a Las Vegas depot
//! - Builders for deliveries and routes
//! - Matrix providers that count calls or add latency

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use delivery_sequencer::matrix::{CostScaling, DistanceMatrix, HaversineMatrix};
use delivery_sequencer::model::{
    Coordinate, Delivery, DeliveryId, DeliveryStatus, Route, RouteId, RouteStatus,
};
use delivery_sequencer::traits::DistanceMatrixProvider;

/// 2026-01-01 09:00:00 UTC
pub const NINE_AM: i64 = 1_767_258_000;

/// Warehouse off the Las Vegas Strip.
pub const DEPOT: Coordinate = Coordinate::new(36.1000, -115.1700);

/// Kilometers per degree of latitude on a 6371 km sphere.
const KM_PER_DEGREE: f64 = 111.195;

/// Scheduled timestamp `m` minutes after 09:00.
pub fn at(m: i64) -> i64 {
    NINE_AM + m * 60
}

/// A point `km` north (negative: south) of the depot.
pub fn north(km: f64) -> Coordinate {
    Coordinate::new(DEPOT.latitude + km / KM_PER_DEGREE, DEPOT.longitude)
}

/// A point `north_km` north and `east_km` east of the depot.
pub fn offset(north_km: f64, east_km: f64) -> Coordinate {
    let km_per_degree_lng = KM_PER_DEGREE * DEPOT.latitude.to_radians().cos();
    Coordinate::new(
        DEPOT.latitude + north_km / KM_PER_DEGREE,
        DEPOT.longitude + east_km / km_per_degree_lng,
    )
}

/// Builder for test deliveries with sensible defaults.
#[derive(Clone, Debug)]
pub struct TestDelivery {
    delivery: Delivery,
}

impl TestDelivery {
    pub fn new(id: &str) -> Self {
        Self {
            delivery: Delivery {
                id: DeliveryId::new(id),
                route_id: RouteId::new("route-1"),
                status: DeliveryStatus::Pending,
                location: DEPOT,
                scheduled_time: Some(NINE_AM),
                completed_time: None,
                proof: None,
            },
        }
    }

    pub fn north_km(mut self, km: f64) -> Self {
        self.delivery.location = north(km);
        self
    }

    pub fn location(mut self, location: Coordinate) -> Self {
        self.delivery.location = location;
        self
    }

    pub fn scheduled_at(mut self, minutes_after_nine: i64) -> Self {
        self.delivery.scheduled_time = Some(at(minutes_after_nine));
        self
    }

    pub fn scheduled_at_secs(mut self, seconds_after_nine: i64) -> Self {
        self.delivery.scheduled_time = Some(NINE_AM + seconds_after_nine);
        self
    }

    pub fn unscheduled(mut self) -> Self {
        self.delivery.scheduled_time = None;
        self
    }

    pub fn status(mut self, status: DeliveryStatus) -> Self {
        self.delivery.status = status;
        self
    }

    pub fn build(self) -> Delivery {
        self.delivery
    }
}

pub fn route(id: &str, deliveries: Vec<Delivery>) -> Route {
    Route {
        id: RouteId::new(id),
        vehicle_id: "van-7".to_string(),
        driver_id: "driver-3".to_string(),
        deliveries,
        status: RouteStatus::InProgress,
        start_time: Some(NINE_AM),
        end_time: None,
        optimization_score: None,
    }
}

pub fn ids(deliveries: &[Delivery]) -> Vec<&str> {
    deliveries.iter().map(|d| d.id.0.as_str()).collect()
}

/// Haversine matrix that records how often it is asked for a matrix.
#[derive(Debug, Default)]
pub struct CountingMatrix {
    inner: HaversineMatrix,
    calls: AtomicUsize,
}

impl CountingMatrix {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DistanceMatrixProvider for CountingMatrix {
    fn matrix_for(&self, locations: &[Coordinate], scaling: CostScaling) -> DistanceMatrix {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.matrix_for(locations, scaling)
    }
}

/// Haversine matrix that sleeps before answering.
#[derive(Debug)]
pub struct SlowMatrix {
    pub delay: Duration,
}

impl DistanceMatrixProvider for SlowMatrix {
    fn matrix_for(&self, locations: &[Coordinate], scaling: CostScaling) -> DistanceMatrix {
        std::thread::sleep(self.delay);
        HaversineMatrix::default().matrix_for(locations, scaling)
    }
}
