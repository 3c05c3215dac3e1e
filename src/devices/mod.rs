//! Physical device models driven by the dispatch engine.

/// Stationary battery storage model with capacity fade.
pub mod battery;

pub use battery::{Battery, BatteryMetrics, BatteryParams, DegradationOutcome};
