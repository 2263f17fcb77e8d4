//! delivery-sequencer core
//!
//! Single-vehicle stop sequencing with time windows, traffic scaling and
//! road closures, plus the policy deciding when a route gets re-solved.

pub mod budget;
pub mod closure;
pub mod conditions_feed;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod matrix;
pub mod model;
pub mod solver;
pub mod time_window;
pub mod traits;
pub mod trigger;
