//! File import and export around the simulation core.

pub mod export;
pub mod profiles;
