//! Forecasting utilities for the simulator.

use crate::error::ConfigError;
use crate::sim::types::{HOURS_PER_DAY, Profiles};

/// Naive "tomorrow is today" forecaster.
#[derive(Debug, Default, Clone, Copy)]
pub struct NaiveForecast;

impl NaiveForecast {
    /// Produce a naive forecast for the given horizon.
    ///
    /// Copies the provided baseline and repeats or truncates it to match
    /// the requested simulation horizon.
    ///
    /// # Arguments
    ///
    /// * `baseline` - Historical or baseline values used as the forecast template
    /// * `horizon` - Number of steps to forecast
    ///
    /// # Returns
    ///
    /// A vector of forecast values with length equal to `horizon`.
    pub fn forecast(&self, baseline: &[f64], horizon: usize) -> Vec<f64> {
        if baseline.is_empty() {
            return vec![0.0; horizon];
        }
        baseline.iter().copied().cycle().take(horizon).collect()
    }

    /// Persistence forecast of solar and load.
    ///
    /// Each day's solar and load are forecast as the previous day's actuals;
    /// the first day, having no history, is forecast perfectly. Prices are
    /// published in advance and copied unchanged.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` only if the shifted series fail validation,
    /// which cannot happen for series taken from valid `Profiles`.
    pub fn persistence(&self, actual: &Profiles) -> Result<Profiles, ConfigError> {
        let shift = |series: &[f64]| -> Vec<f64> {
            (0..series.len())
                .map(|t| {
                    if t >= HOURS_PER_DAY {
                        series[t - HOURS_PER_DAY]
                    } else {
                        series[t]
                    }
                })
                .collect()
        };

        Profiles::new(
            shift(actual.solar_kwh()),
            shift(actual.load_kwh()),
            actual.price_buy().to_vec(),
            actual.price_sell().to_vec(),
        )
    }
}
