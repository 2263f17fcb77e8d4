//! Error taxonomy for sequencing calls.

use std::fmt;

use crate::model::DeliveryId;

/// Why a request was rejected before reaching the solver.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidInput {
    CoordinateOutOfRange { latitude: f64, longitude: f64 },
    MissingScheduledTime(DeliveryId),
    DuplicateDelivery(DeliveryId),
    TrafficFactor(f64),
}

impl fmt::Display for InvalidInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidInput::CoordinateOutOfRange {
                latitude,
                longitude,
            } => write!(f, "coordinate out of range: ({}, {})", latitude, longitude),
            InvalidInput::MissingScheduledTime(id) => {
                write!(f, "delivery {} has no scheduled time", id)
            }
            InvalidInput::DuplicateDelivery(id) => write!(f, "delivery {} appears twice", id),
            InvalidInput::TrafficFactor(factor) => {
                write!(f, "traffic factor must be finite and >= 1.0, got {}", factor)
            }
        }
    }
}

/// Recoverable solver outcome. The caller keeps its previous order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveFailure {
    /// No ordering satisfies every time window.
    Infeasible,
    /// The wall-clock budget ran out, or the solve was cancelled.
    Timeout,
}

impl fmt::Display for SolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveFailure::Infeasible => f.write_str("no ordering satisfies all time windows"),
            SolveFailure::Timeout => f.write_str("solve budget exceeded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SequencingError {
    InvalidInput(InvalidInput),
    Infeasible,
    Timeout,
}

impl SequencingError {
    /// The recoverable failure kind, if this is not an input error.
    pub fn failure(&self) -> Option<SolveFailure> {
        match self {
            SequencingError::InvalidInput(_) => None,
            SequencingError::Infeasible => Some(SolveFailure::Infeasible),
            SequencingError::Timeout => Some(SolveFailure::Timeout),
        }
    }
}

impl fmt::Display for SequencingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencingError::InvalidInput(err) => write!(f, "invalid input: {}", err),
            SequencingError::Infeasible => SolveFailure::Infeasible.fmt(f),
            SequencingError::Timeout => SolveFailure::Timeout.fmt(f),
        }
    }
}

impl std::error::Error for InvalidInput {}
impl std::error::Error for SolveFailure {}
impl std::error::Error for SequencingError {}

impl From<InvalidInput> for SequencingError {
    fn from(err: InvalidInput) -> Self {
        SequencingError::InvalidInput(err)
    }
}

impl From<SolveFailure> for SequencingError {
    fn from(failure: SolveFailure) -> Self {
        match failure {
            SolveFailure::Infeasible => SequencingError::Infeasible,
            SolveFailure::Timeout => SequencingError::Timeout,
        }
    }
}
