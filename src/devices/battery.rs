use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Lowest state of health the degradation model will report.
const MIN_STATE_OF_HEALTH: f64 = 1e-3;

/// Temperature at which the battery runs at its rated efficiency (°C).
const OPTIMAL_TEMPERATURE_C: f64 = 25.0;

/// Static battery parameters, as given in the `[battery]` scenario table.
///
/// Defaults describe a 13.5 kWh / 5 kW home battery starting empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryParams {
    /// Nominal energy capacity (kWh).
    pub capacity_kwh: f64,
    /// Stored energy at the start of the run (kWh).
    pub initial_soc_kwh: f64,
    /// Maximum charging power (kW).
    pub max_charge_kw: f64,
    /// Maximum discharging power (kW).
    pub max_discharge_kw: f64,
    /// Round-trip efficiency in (0, 1], applied on the charging side.
    pub round_trip_efficiency: f64,
    /// Operating temperature (°C).
    pub temperature_c: f64,
    /// Capacity lost per kWh of throughput (kWh/kWh).
    pub degradation_rate: f64,
    /// Capacity fraction lost per equivalent full cycle raised to `cycle_fade_exponent`.
    pub cycle_fade_coefficient: f64,
    /// Sub-linear exponent applied to equivalent full cycles, in (0, 1].
    pub cycle_fade_exponent: f64,
    /// Power cap relative to usable capacity (1.0 = 1C).
    pub c_rate_limit: f64,
}

impl Default for BatteryParams {
    fn default() -> Self {
        Self {
            capacity_kwh: 13.5,
            initial_soc_kwh: 0.0,
            max_charge_kw: 5.0,
            max_discharge_kw: 5.0,
            round_trip_efficiency: 0.95,
            temperature_c: OPTIMAL_TEMPERATURE_C,
            degradation_rate: 0.000_05,
            cycle_fade_coefficient: 0.000_5,
            cycle_fade_exponent: 0.75,
            c_rate_limit: 1.0,
        }
    }
}

impl BatteryParams {
    /// Checks every parameter and returns the first violation.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` naming the offending `battery.*` field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            ("battery.capacity_kwh", self.capacity_kwh),
            ("battery.initial_soc_kwh", self.initial_soc_kwh),
            ("battery.max_charge_kw", self.max_charge_kw),
            ("battery.max_discharge_kw", self.max_discharge_kw),
            ("battery.round_trip_efficiency", self.round_trip_efficiency),
            ("battery.temperature_c", self.temperature_c),
            ("battery.degradation_rate", self.degradation_rate),
            ("battery.cycle_fade_coefficient", self.cycle_fade_coefficient),
            ("battery.cycle_fade_exponent", self.cycle_fade_exponent),
            ("battery.c_rate_limit", self.c_rate_limit),
        ];
        if let Some((field, _)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::new(*field, "must be a finite number"));
        }

        if self.capacity_kwh <= 0.0 {
            return Err(ConfigError::new("battery.capacity_kwh", "must be > 0"));
        }
        if !(0.0..=self.capacity_kwh).contains(&self.initial_soc_kwh) {
            return Err(ConfigError::new(
                "battery.initial_soc_kwh",
                format!("must be in [0, {}]", self.capacity_kwh),
            ));
        }
        if self.max_charge_kw < 0.0 {
            return Err(ConfigError::new("battery.max_charge_kw", "must be >= 0"));
        }
        if self.max_discharge_kw < 0.0 {
            return Err(ConfigError::new("battery.max_discharge_kw", "must be >= 0"));
        }
        if self.round_trip_efficiency <= 0.0 || self.round_trip_efficiency > 1.0 {
            return Err(ConfigError::new(
                "battery.round_trip_efficiency",
                "must be in (0, 1]",
            ));
        }
        if self.degradation_rate < 0.0 {
            return Err(ConfigError::new("battery.degradation_rate", "must be >= 0"));
        }
        if self.cycle_fade_coefficient < 0.0 {
            return Err(ConfigError::new(
                "battery.cycle_fade_coefficient",
                "must be >= 0",
            ));
        }
        if self.cycle_fade_exponent <= 0.0 || self.cycle_fade_exponent > 1.0 {
            return Err(ConfigError::new(
                "battery.cycle_fade_exponent",
                "must be in (0, 1]",
            ));
        }
        if self.c_rate_limit <= 0.0 {
            return Err(ConfigError::new("battery.c_rate_limit", "must be > 0"));
        }
        Ok(())
    }
}

/// Result of one hourly degradation update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegradationOutcome {
    /// State of health after the update, in (0, 1].
    pub state_of_health: f64,
    /// Usable capacity after the update (kWh).
    pub usable_capacity_kwh: f64,
    /// Stored energy discarded because it no longer fit the shrunk capacity (kWh).
    pub soc_clipped_kwh: f64,
}

/// Read-only snapshot of the battery state.
///
/// Strategies receive this as their view of the battery; the engine also
/// reports it at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatteryMetrics {
    pub capacity_kwh: f64,
    pub usable_capacity_kwh: f64,
    pub soc_kwh: f64,
    pub soc_percent: f64,
    pub max_charge_kw: f64,
    pub max_discharge_kw: f64,
    pub c_rate_limit: f64,
    pub round_trip_efficiency: f64,
    /// Round-trip efficiency after the temperature adjustment.
    pub efficiency: f64,
    pub state_of_health: f64,
    pub degradation_kwh: f64,
    pub cumulative_throughput_kwh: f64,
    pub equivalent_full_cycles: f64,
    pub cycles_per_day: f64,
    pub temperature_c: f64,
    pub charge_events: u64,
    pub discharge_events: u64,
    pub peak_power_kw: f64,
    /// Hourly steps the battery has been through.
    pub hours_elapsed: u64,
}

impl BatteryMetrics {
    /// Charging power limit after the C-rate cap (kW).
    pub fn charge_limit_kw(&self) -> f64 {
        self.max_charge_kw
            .min(self.c_rate_limit * self.usable_capacity_kwh)
    }

    /// Discharging power limit after the C-rate cap (kW).
    pub fn discharge_limit_kw(&self) -> f64 {
        self.max_discharge_kw
            .min(self.c_rate_limit * self.usable_capacity_kwh)
    }

    /// Free storage space in stored-energy terms (kWh).
    pub fn headroom_kwh(&self) -> f64 {
        (self.usable_capacity_kwh - self.soc_kwh).max(0.0)
    }

    /// Largest input the battery accepts over `duration_h` (kWh).
    pub fn max_charge_input_kwh(&self, duration_h: f64) -> f64 {
        (self.charge_limit_kw() * duration_h).min(self.headroom_kwh() / self.efficiency)
    }

    /// Largest output the battery delivers over `duration_h` (kWh).
    pub fn max_discharge_output_kwh(&self, duration_h: f64) -> f64 {
        (self.discharge_limit_kw() * duration_h).min(self.soc_kwh)
    }
}

/// Stationary battery with efficiency losses and capacity fade.
///
/// Efficiency is applied once per round trip, on the way in: charging
/// `x` kWh stores `x * efficiency`, discharging `y` kWh removes exactly `y`.
/// Capacity fade combines a throughput term with a sub-linear cycle term
/// and is recomputed by [`Battery::step_degradation`] after every hour.
#[derive(Debug, Clone, PartialEq)]
pub struct Battery {
    params: BatteryParams,
    usable_capacity_kwh: f64,
    soc_kwh: f64,
    state_of_health: f64,
    cumulative_throughput_kwh: f64,
    temperature_c: f64,
    charge_events: u64,
    discharge_events: u64,
    peak_power_kw: f64,
    hours_elapsed: u64,
}

impl Battery {
    /// Creates a fresh battery at full health.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if any parameter is out of range.
    pub fn new(params: &BatteryParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            params: params.clone(),
            usable_capacity_kwh: params.capacity_kwh,
            soc_kwh: params.initial_soc_kwh,
            state_of_health: 1.0,
            cumulative_throughput_kwh: 0.0,
            temperature_c: params.temperature_c,
            charge_events: 0,
            discharge_events: 0,
            peak_power_kw: 0.0,
            hours_elapsed: 0,
        })
    }

    pub fn params(&self) -> &BatteryParams {
        &self.params
    }

    pub fn soc_kwh(&self) -> f64 {
        self.soc_kwh
    }

    pub fn usable_capacity_kwh(&self) -> f64 {
        self.usable_capacity_kwh
    }

    pub fn state_of_health(&self) -> f64 {
        self.state_of_health
    }

    pub fn cumulative_throughput_kwh(&self) -> f64 {
        self.cumulative_throughput_kwh
    }

    /// Throughput divided by twice the nominal capacity.
    pub fn equivalent_full_cycles(&self) -> f64 {
        self.cumulative_throughput_kwh / (2.0 * self.params.capacity_kwh)
    }

    pub fn set_temperature(&mut self, temperature_c: f64) {
        self.temperature_c = temperature_c;
    }

    /// Efficiency multiplier for the current temperature.
    fn temperature_factor(&self) -> f64 {
        let diff = (self.temperature_c - OPTIMAL_TEMPERATURE_C).abs();
        if diff < 10.0 {
            1.0
        } else if diff < 20.0 {
            0.98
        } else if diff < 30.0 {
            0.95
        } else {
            0.90
        }
    }

    /// Round-trip efficiency after the temperature adjustment.
    pub fn efficiency(&self) -> f64 {
        self.params.round_trip_efficiency * self.temperature_factor()
    }

    fn charge_limit_kw(&self) -> f64 {
        self.params
            .max_charge_kw
            .min(self.params.c_rate_limit * self.usable_capacity_kwh)
    }

    fn discharge_limit_kw(&self) -> f64 {
        self.params
            .max_discharge_kw
            .min(self.params.c_rate_limit * self.usable_capacity_kwh)
    }

    /// Absorbs up to `requested_kwh` over `duration_h` and returns the amount taken.
    ///
    /// The request is clipped by the charging power limit and by the free
    /// space, the latter converted to the input side through the efficiency.
    /// Non-positive requests absorb nothing.
    pub fn charge(&mut self, requested_kwh: f64, duration_h: f64) -> f64 {
        if !(requested_kwh > 0.0) || !(duration_h > 0.0) {
            return 0.0;
        }

        let efficiency = self.efficiency();
        let power_cap_kwh = self.charge_limit_kw() * duration_h;
        let headroom_input_kwh = ((self.usable_capacity_kwh - self.soc_kwh) / efficiency).max(0.0);
        let accepted = requested_kwh.min(power_cap_kwh).min(headroom_input_kwh);
        if accepted <= 0.0 {
            return 0.0;
        }

        self.soc_kwh = (self.soc_kwh + accepted * efficiency).min(self.usable_capacity_kwh);
        self.cumulative_throughput_kwh += accepted;
        self.charge_events += 1;
        self.peak_power_kw = self.peak_power_kw.max(accepted / duration_h);
        accepted
    }

    /// Delivers up to `requested_kwh` over `duration_h` and returns the amount supplied.
    pub fn discharge(&mut self, requested_kwh: f64, duration_h: f64) -> f64 {
        if !(requested_kwh > 0.0) || !(duration_h > 0.0) {
            return 0.0;
        }

        let power_cap_kwh = self.discharge_limit_kw() * duration_h;
        let supplied = requested_kwh.min(power_cap_kwh).min(self.soc_kwh);
        if supplied <= 0.0 {
            return 0.0;
        }

        self.soc_kwh = (self.soc_kwh - supplied).max(0.0);
        self.cumulative_throughput_kwh += supplied;
        self.discharge_events += 1;
        self.peak_power_kw = self.peak_power_kw.max(supplied / duration_h);
        supplied
    }

    /// Closes one hourly step: recomputes health and usable capacity.
    ///
    /// If the stored energy no longer fits the shrunk capacity it is clipped,
    /// and the discarded amount is returned in the outcome.
    pub fn step_degradation(&mut self) -> DegradationOutcome {
        let capacity = self.params.capacity_kwh;
        let throughput_loss_kwh = self.cumulative_throughput_kwh * self.params.degradation_rate;
        let cycle_loss_kwh = capacity
            * self.params.cycle_fade_coefficient
            * self
                .equivalent_full_cycles()
                .powf(self.params.cycle_fade_exponent);

        let health = (1.0 - (throughput_loss_kwh + cycle_loss_kwh) / capacity)
            .clamp(MIN_STATE_OF_HEALTH, 1.0)
            .min(self.state_of_health);
        self.state_of_health = health;
        self.usable_capacity_kwh = capacity * health;

        let soc_clipped_kwh = (self.soc_kwh - self.usable_capacity_kwh).max(0.0);
        if soc_clipped_kwh > 0.0 {
            warn!(
                hour = self.hours_elapsed,
                clipped_kwh = soc_clipped_kwh,
                usable_kwh = self.usable_capacity_kwh,
                "stored energy exceeds degraded capacity, clipping"
            );
            self.soc_kwh = self.usable_capacity_kwh;
        }
        self.hours_elapsed += 1;

        DegradationOutcome {
            state_of_health: health,
            usable_capacity_kwh: self.usable_capacity_kwh,
            soc_clipped_kwh,
        }
    }

    /// Snapshot of all state fields plus derived metrics.
    pub fn metrics(&self) -> BatteryMetrics {
        let cycles = self.equivalent_full_cycles();
        let cycles_per_day = if self.hours_elapsed > 0 {
            cycles * 24.0 / self.hours_elapsed as f64
        } else {
            0.0
        };
        let soc_percent = if self.usable_capacity_kwh > 0.0 {
            100.0 * self.soc_kwh / self.usable_capacity_kwh
        } else {
            0.0
        };

        BatteryMetrics {
            capacity_kwh: self.params.capacity_kwh,
            usable_capacity_kwh: self.usable_capacity_kwh,
            soc_kwh: self.soc_kwh,
            soc_percent,
            max_charge_kw: self.params.max_charge_kw,
            max_discharge_kw: self.params.max_discharge_kw,
            c_rate_limit: self.params.c_rate_limit,
            round_trip_efficiency: self.params.round_trip_efficiency,
            efficiency: self.efficiency(),
            state_of_health: self.state_of_health,
            degradation_kwh: self.params.capacity_kwh - self.usable_capacity_kwh,
            cumulative_throughput_kwh: self.cumulative_throughput_kwh,
            equivalent_full_cycles: cycles,
            cycles_per_day,
            temperature_c: self.temperature_c,
            charge_events: self.charge_events,
            discharge_events: self.discharge_events,
            peak_power_kw: self.peak_power_kw,
            hours_elapsed: self.hours_elapsed,
        }
    }
}
