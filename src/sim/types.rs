//! Core simulation types: horizon, input series, decisions, and step records.

use std::fmt;

use serde::Serialize;

use crate::devices::BatteryMetrics;
use crate::error::ConfigError;
use crate::sim::strategy::StrategyKind;

/// Hours in one simulated day.
pub const HOURS_PER_DAY: usize = 24;

/// Duration of one simulation step in hours.
pub const STEP_HOURS: f64 = 1.0;

/// Simulation horizon.
///
/// # Examples
///
/// ```
/// use microgrid_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(2);
/// assert_eq!(cfg.total_hours(), 48);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    /// Number of days to simulate.
    pub days: usize,
}

impl SimConfig {
    /// Creates a horizon of `days` days.
    ///
    /// # Panics
    ///
    /// Panics if `days` is zero.
    pub fn new(days: usize) -> Self {
        assert!(days > 0, "days must be > 0");
        Self { days }
    }

    /// Total number of hourly steps across all days.
    pub fn total_hours(&self) -> usize {
        self.days * HOURS_PER_DAY
    }
}

/// Inputs of a single hour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HourSample {
    pub solar_kwh: f64,
    pub load_kwh: f64,
    pub price_buy: f64,
    pub price_sell: f64,
}

impl HourSample {
    /// Load minus solar; positive is a deficit, negative a surplus.
    pub fn net_load_kwh(&self) -> f64 {
        self.load_kwh - self.solar_kwh
    }
}

/// Hourly input series for one simulation horizon.
///
/// All four series share one length. Solar and load are energy per hour
/// (kWh), prices are currency per kWh.
#[derive(Debug, Clone, PartialEq)]
pub struct Profiles {
    solar_kwh: Vec<f64>,
    load_kwh: Vec<f64>,
    price_buy: Vec<f64>,
    price_sell: Vec<f64>,
}

impl Profiles {
    /// Builds and validates a profile set.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the series are empty, differ in length,
    /// contain non-finite values, or carry negative solar or load.
    pub fn new(
        solar_kwh: Vec<f64>,
        load_kwh: Vec<f64>,
        price_buy: Vec<f64>,
        price_sell: Vec<f64>,
    ) -> Result<Self, ConfigError> {
        if solar_kwh.is_empty() {
            return Err(ConfigError::new("profiles.solar_kwh", "must not be empty"));
        }
        let len = solar_kwh.len();
        for (field, series) in [
            ("profiles.load_kwh", &load_kwh),
            ("pricing.price_buy", &price_buy),
            ("pricing.price_sell", &price_sell),
        ] {
            if series.len() != len {
                return Err(ConfigError::new(
                    field,
                    format!("has {} values, expected {len}", series.len()),
                ));
            }
        }

        for (field, series, non_negative) in [
            ("profiles.solar_kwh", &solar_kwh, true),
            ("profiles.load_kwh", &load_kwh, true),
            ("pricing.price_buy", &price_buy, false),
            ("pricing.price_sell", &price_sell, false),
        ] {
            if let Some(hour) = series.iter().position(|v| !v.is_finite()) {
                return Err(ConfigError::new(
                    field,
                    format!("value at hour {hour} is not finite"),
                ));
            }
            if non_negative {
                if let Some(hour) = series.iter().position(|v| *v < 0.0) {
                    return Err(ConfigError::new(
                        field,
                        format!("value at hour {hour} is negative"),
                    ));
                }
            }
        }

        Ok(Self {
            solar_kwh,
            load_kwh,
            price_buy,
            price_sell,
        })
    }

    /// Number of hourly samples.
    pub fn len(&self) -> usize {
        self.solar_kwh.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solar_kwh.is_empty()
    }

    /// Number of days touched by the horizon.
    pub fn days(&self) -> usize {
        self.len().div_ceil(HOURS_PER_DAY)
    }

    pub fn solar_kwh(&self) -> &[f64] {
        &self.solar_kwh
    }

    pub fn load_kwh(&self) -> &[f64] {
        &self.load_kwh
    }

    pub fn price_buy(&self) -> &[f64] {
        &self.price_buy
    }

    pub fn price_sell(&self) -> &[f64] {
        &self.price_sell
    }

    /// Inputs of hour `hour`.
    ///
    /// # Panics
    ///
    /// Panics if `hour` is out of range.
    pub fn sample(&self, hour: usize) -> HourSample {
        HourSample {
            solar_kwh: self.solar_kwh[hour],
            load_kwh: self.load_kwh[hour],
            price_buy: self.price_buy[hour],
            price_sell: self.price_sell[hour],
        }
    }

    /// All hours as samples.
    pub fn samples(&self) -> Vec<HourSample> {
        (0..self.len()).map(|t| self.sample(t)).collect()
    }

    /// Copies hours `[start, start + len)`, truncated to the horizon.
    pub fn slice(&self, start: usize, len: usize) -> Option<Self> {
        let end = start.checked_add(len)?.min(self.len());
        if start >= end {
            return None;
        }
        Some(Self {
            solar_kwh: self.solar_kwh[start..end].to_vec(),
            load_kwh: self.load_kwh[start..end].to_vec(),
            price_buy: self.price_buy[start..end].to_vec(),
            price_sell: self.price_sell[start..end].to_vec(),
        })
    }

    /// Copies day `day` (24 hours, or fewer for a partial last day).
    pub fn day(&self, day: usize) -> Option<Self> {
        self.slice(day * HOURS_PER_DAY, HOURS_PER_DAY)
    }
}

/// One hour's action as proposed by a strategy.
///
/// All quantities are kWh and non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DispatchDecision {
    pub grid_buy_kwh: f64,
    pub grid_sell_kwh: f64,
    pub bat_charge_kwh: f64,
    pub bat_discharge_kwh: f64,
}

impl DispatchDecision {
    /// Grid covers the whole net load; battery untouched.
    pub fn grid_only(net_load_kwh: f64) -> Self {
        if net_load_kwh > 0.0 {
            Self {
                grid_buy_kwh: net_load_kwh,
                ..Self::default()
            }
        } else if net_load_kwh < 0.0 {
            Self {
                grid_sell_kwh: -net_load_kwh,
                ..Self::default()
            }
        } else {
            Self::default()
        }
    }

    /// Charges `charge_kwh` and lets the grid settle the rest of `net_load_kwh`.
    pub fn charging(net_load_kwh: f64, charge_kwh: f64) -> Self {
        Self {
            bat_charge_kwh: charge_kwh,
            ..Self::grid_only(net_load_kwh + charge_kwh)
        }
    }

    /// Discharges `discharge_kwh` and lets the grid settle the rest of `net_load_kwh`.
    pub fn discharging(net_load_kwh: f64, discharge_kwh: f64) -> Self {
        Self {
            bat_discharge_kwh: discharge_kwh,
            ..Self::grid_only(net_load_kwh - discharge_kwh)
        }
    }

    /// Collapses simultaneous charge and discharge into a single direction.
    ///
    /// Netting happens in stored-energy terms, so the resulting state of
    /// charge is the same as applying both flows.
    pub fn netted(&self, efficiency: f64) -> Self {
        let charge = self.bat_charge_kwh.max(0.0);
        let discharge = self.bat_discharge_kwh.max(0.0);
        if charge == 0.0 || discharge == 0.0 {
            return Self {
                bat_charge_kwh: charge,
                bat_discharge_kwh: discharge,
                ..*self
            };
        }

        let stored_delta = efficiency * charge - discharge;
        if stored_delta >= 0.0 {
            Self {
                bat_charge_kwh: stored_delta / efficiency,
                bat_discharge_kwh: 0.0,
                ..*self
            }
        } else {
            Self {
                bat_charge_kwh: 0.0,
                bat_discharge_kwh: -stored_delta,
                ..*self
            }
        }
    }
}

/// Everything a strategy sees when deciding hour `hour`.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    /// Absolute hour index within the horizon.
    pub hour: usize,
    /// Actual inputs of this hour.
    pub sample: HourSample,
    /// Forecast from this hour to the end of the horizon; index 0 is this hour.
    pub forecast: &'a [HourSample],
}

impl StepInput<'_> {
    /// Hour within the day (0..24).
    pub fn hour_of_day(&self) -> usize {
        self.hour % HOURS_PER_DAY
    }

    pub fn net_load_kwh(&self) -> f64 {
        self.sample.net_load_kwh()
    }
}

/// Realized outcome of one simulated hour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    /// Absolute hour index.
    pub hour: usize,
    pub day: usize,
    pub hour_of_day: usize,
    pub solar_kwh: f64,
    pub load_kwh: f64,
    pub price_buy: f64,
    pub price_sell: f64,
    /// Grid import, settled as the residual after battery action.
    pub grid_buy_kwh: f64,
    /// Grid export, settled as the residual after battery action.
    pub grid_sell_kwh: f64,
    /// Energy the battery actually absorbed from the bus.
    pub bat_charge_kwh: f64,
    /// Energy the battery actually delivered to the bus.
    pub bat_discharge_kwh: f64,
    /// Charge requested by the strategy before clipping.
    pub requested_charge_kwh: f64,
    /// Discharge requested by the strategy before clipping.
    pub requested_discharge_kwh: f64,
    /// Stored energy at the end of the hour.
    pub soc_kwh: f64,
    pub usable_capacity_kwh: f64,
    pub state_of_health: f64,
    pub cumulative_throughput_kwh: f64,
    /// Stored energy lost because degradation shrank usable capacity below it.
    pub soc_clipped_kwh: f64,
    /// Net cost of the hour (import cost minus export revenue).
    pub cost: f64,
    pub cumulative_cost: f64,
}

impl StepResult {
    /// Sources minus sinks on the bus; zero when the hour balances.
    pub fn balance_error_kwh(&self) -> f64 {
        (self.solar_kwh + self.grid_buy_kwh + self.bat_discharge_kwh)
            - (self.load_kwh + self.bat_charge_kwh + self.grid_sell_kwh)
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "h={:>3} (d{} {:>2}:00) | solar={:>5.2} load={:>5.2} | \
             buy={:>5.2} sell={:>5.2} | chg={:>5.2} dis={:>5.2} \
             (SoC={:>5.2} kWh, SoH={:.4}) | price={:.2}/{:.2} cost={:>7.2} cum={:>8.2}",
            self.hour,
            self.day,
            self.hour_of_day,
            self.solar_kwh,
            self.load_kwh,
            self.grid_buy_kwh,
            self.grid_sell_kwh,
            self.bat_charge_kwh,
            self.bat_discharge_kwh,
            self.soc_kwh,
            self.state_of_health,
            self.price_buy,
            self.price_sell,
            self.cost,
            self.cumulative_cost,
        )
    }
}

/// Ordered step records of one strategy over one horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRun {
    pub strategy: StrategyKind,
    pub steps: Vec<StepResult>,
    /// Battery state after the last step.
    pub final_battery: BatteryMetrics,
}

impl SimulationRun {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sum of hourly costs.
    pub fn total_cost(&self) -> f64 {
        self.steps.iter().map(|s| s.cost).sum()
    }

    pub fn total_grid_buy_kwh(&self) -> f64 {
        self.steps.iter().map(|s| s.grid_buy_kwh).sum()
    }

    pub fn total_grid_sell_kwh(&self) -> f64 {
        self.steps.iter().map(|s| s.grid_sell_kwh).sum()
    }

    pub fn total_charge_kwh(&self) -> f64 {
        self.steps.iter().map(|s| s.bat_charge_kwh).sum()
    }

    pub fn total_discharge_kwh(&self) -> f64 {
        self.steps.iter().map(|s| s.bat_discharge_kwh).sum()
    }

    /// Cost per simulated day, in day order.
    pub fn daily_costs(&self) -> Vec<f64> {
        let days = self.steps.last().map_or(0, |s| s.day + 1);
        let mut costs = vec![0.0; days];
        for s in &self.steps {
            costs[s.day] += s.cost;
        }
        costs
    }
}
