//! Error taxonomy shared by the battery model, strategies, and engine.

use thiserror::Error;

/// Invalid static parameter, detected before any simulation step runs.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"battery.capacity_kwh"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Linear program failure inside the global optimizer or an MPC sub-solve.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("solver failed at hour {hour} ({horizon}h window): {reason}")]
pub struct SolverError {
    /// Absolute hour index at which the failing window starts.
    pub hour: usize,
    /// Number of hours in the failing window.
    pub horizon: usize,
    /// Solver-reported reason.
    pub reason: String,
}

/// Reason a simulation run was aborted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Solver(#[from] SolverError),
}
