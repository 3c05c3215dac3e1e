/// Strategy comparison across parallel runs.
pub mod compare;
pub mod engine;
/// Investment appraisal of a run.
pub mod financial;
pub mod kpi;
pub mod power_balance;
/// Dispatch strategies.
pub mod strategy;
pub mod types;
/// Post-hoc run validation.
pub mod validator;
