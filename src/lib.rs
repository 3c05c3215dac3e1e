//! Hourly microgrid dispatch simulator.
//!
//! Simulates a single site with solar, one battery, a load and a grid
//! connection, and compares battery scheduling strategies on cost.

pub mod config;
pub mod devices;
pub mod error;
pub mod forecast;
pub mod io;
pub mod pricing;
/// Simulation engine, strategies, validation and KPIs.
pub mod sim;
