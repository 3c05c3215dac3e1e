//! Dispatch strategies and their configuration.
//!
//! Every strategy implements [`Strategy`]: given the hour's inputs, the
//! forecast window and a battery snapshot, it proposes one
//! [`DispatchDecision`]. Strategies hold only tunables; none of them keeps
//! state between calls.

mod greedy;
mod optimizer;
mod rules;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::devices::BatteryMetrics;
use crate::error::{ConfigError, SolverError};
use crate::sim::types::{DispatchDecision, HOURS_PER_DAY, HourSample, StepInput};

pub use greedy::Greedy;
pub use optimizer::{LinearOptimizer, MpcStrategy};
pub use rules::{HourClass, NaiveStrategy, PeakShaving, SelfConsumption, TimeOfUse};

/// Per-hour dispatch policy.
pub trait Strategy {
    fn kind(&self) -> StrategyKind;

    /// Proposes the action for `input.hour`.
    ///
    /// # Errors
    ///
    /// Only optimizer-backed strategies fail, with a `SolverError` naming the hour.
    fn decide(
        &self,
        input: &StepInput<'_>,
        battery: &BatteryMetrics,
    ) -> Result<DispatchDecision, SolverError>;

    /// Plans the whole `samples` window at once.
    ///
    /// Strategies that decide hour by hour return `None`; the engine then
    /// calls [`Strategy::decide`] once per hour instead.
    fn plan(
        &self,
        _samples: &[HourSample],
        _battery: &BatteryMetrics,
    ) -> Option<Result<Vec<DispatchDecision>, SolverError>> {
        None
    }
}

/// How the engine drives a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One `decide` call per hour.
    StepByStep,
    /// One plan over the whole horizon, replayed hour by hour.
    Global,
}

/// The closed set of dispatch strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Naive,
    SelfConsumption,
    PeakShaving,
    TimeOfUse,
    Greedy,
    GlobalOptimal,
    Mpc,
}

impl StrategyKind {
    /// All strategies, in comparison order.
    pub const ALL: [StrategyKind; 7] = [
        StrategyKind::Naive,
        StrategyKind::SelfConsumption,
        StrategyKind::PeakShaving,
        StrategyKind::TimeOfUse,
        StrategyKind::Greedy,
        StrategyKind::GlobalOptimal,
        StrategyKind::Mpc,
    ];

    /// Identifier used in scenario files and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Naive => "naive",
            StrategyKind::SelfConsumption => "self_consumption",
            StrategyKind::PeakShaving => "peak_shaving",
            StrategyKind::TimeOfUse => "time_of_use",
            StrategyKind::Greedy => "greedy",
            StrategyKind::GlobalOptimal => "global_optimal",
            StrategyKind::Mpc => "mpc",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            StrategyKind::Naive => "Grid only, battery idle",
            StrategyKind::SelfConsumption => "Store solar surplus, cover deficits from the battery",
            StrategyKind::PeakShaving => "Discharge only above a net-load threshold",
            StrategyKind::TimeOfUse => "Charge off-peak, discharge on-peak",
            StrategyKind::Greedy => "Myopic one-hour cost minimization",
            StrategyKind::GlobalOptimal => "Linear program over the full horizon",
            StrategyKind::Mpc => "Rolling-horizon linear program",
        }
    }

    pub fn execution_mode(self) -> ExecutionMode {
        match self {
            StrategyKind::GlobalOptimal => ExecutionMode::Global,
            _ => ExecutionMode::StepByStep,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .ok_or_else(|| {
                let names: Vec<&str> = StrategyKind::ALL.iter().map(|k| k.name()).collect();
                ConfigError::new(
                    "simulation.strategy",
                    format!("unknown strategy '{s}', expected one of: {}", names.join(", ")),
                )
            })
    }
}

/// Strategy tunables, as given in the `[strategy]` scenario table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyParams {
    /// Net load above which peak shaving discharges (kW).
    pub peak_threshold_kw: f64,
    /// Fraction of usable capacity peak shaving never discharges.
    pub reserve_soc_fraction: f64,
    /// Hours of day treated as peak by time-of-use.
    pub peak_hours: Vec<usize>,
    /// Hours of day treated as off-peak by time-of-use.
    pub off_peak_hours: Vec<usize>,
    /// Fraction of usable capacity time-of-use fills from the grid off-peak.
    pub grid_charge_target: f64,
    /// Value the greedy strategy assigns to one kWh held in the battery.
    pub stored_energy_value: f64,
    /// Look-ahead of the rolling-horizon optimizer (hours).
    pub mpc_horizon_hours: usize,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            peak_threshold_kw: 5.0,
            reserve_soc_fraction: 0.1,
            peak_hours: vec![7, 8, 9, 17, 18, 19, 20],
            off_peak_hours: (0..=6).collect(),
            grid_charge_target: 1.0,
            stored_energy_value: 7.0,
            mpc_horizon_hours: 6,
        }
    }
}

impl StrategyParams {
    /// Returns every invalid tunable.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if !self.peak_threshold_kw.is_finite() || self.peak_threshold_kw < 0.0 {
            errors.push(ConfigError::new(
                "strategy.peak_threshold_kw",
                "must be a finite number >= 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.reserve_soc_fraction) {
            errors.push(ConfigError::new(
                "strategy.reserve_soc_fraction",
                "must be in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.grid_charge_target) {
            errors.push(ConfigError::new(
                "strategy.grid_charge_target",
                "must be in [0, 1]",
            ));
        }
        if !self.stored_energy_value.is_finite() {
            errors.push(ConfigError::new(
                "strategy.stored_energy_value",
                "must be a finite number",
            ));
        }
        if self.mpc_horizon_hours == 0 {
            errors.push(ConfigError::new("strategy.mpc_horizon_hours", "must be > 0"));
        }
        for (field, hours) in [
            ("strategy.peak_hours", &self.peak_hours),
            ("strategy.off_peak_hours", &self.off_peak_hours),
        ] {
            if let Some(h) = hours.iter().find(|h| **h >= HOURS_PER_DAY) {
                errors.push(ConfigError::new(
                    field,
                    format!("hour {h} is outside 0..{HOURS_PER_DAY}"),
                ));
            }
        }
        if let Some(h) = self
            .peak_hours
            .iter()
            .find(|h| self.off_peak_hours.contains(h))
        {
            errors.push(ConfigError::new(
                "strategy.off_peak_hours",
                format!("hour {h} is also listed as peak"),
            ));
        }

        errors
    }
}

/// A strategy together with its tunables.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyConfig {
    Naive(NaiveStrategy),
    SelfConsumption(SelfConsumption),
    PeakShaving(PeakShaving),
    TimeOfUse(TimeOfUse),
    Greedy(Greedy),
    GlobalOptimal(LinearOptimizer),
    Mpc(MpcStrategy),
}

impl StrategyConfig {
    /// Builds the strategy `kind` from the shared tunables.
    pub fn from_kind(kind: StrategyKind, params: &StrategyParams) -> Self {
        match kind {
            StrategyKind::Naive => StrategyConfig::Naive(NaiveStrategy),
            StrategyKind::SelfConsumption => StrategyConfig::SelfConsumption(SelfConsumption),
            StrategyKind::PeakShaving => StrategyConfig::PeakShaving(PeakShaving::new(
                params.peak_threshold_kw,
                params.reserve_soc_fraction,
            )),
            StrategyKind::TimeOfUse => StrategyConfig::TimeOfUse(TimeOfUse::new(
                params.peak_hours.clone(),
                params.off_peak_hours.clone(),
                params.grid_charge_target,
            )),
            StrategyKind::Greedy => {
                StrategyConfig::Greedy(Greedy::new(params.stored_energy_value))
            }
            StrategyKind::GlobalOptimal => StrategyConfig::GlobalOptimal(LinearOptimizer),
            StrategyKind::Mpc => StrategyConfig::Mpc(MpcStrategy::new(params.mpc_horizon_hours)),
        }
    }

    /// Builds every strategy, in [`StrategyKind::ALL`] order.
    pub fn all(params: &StrategyParams) -> Vec<Self> {
        StrategyKind::ALL
            .into_iter()
            .map(|kind| Self::from_kind(kind, params))
            .collect()
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyConfig::Naive(_) => StrategyKind::Naive,
            StrategyConfig::SelfConsumption(_) => StrategyKind::SelfConsumption,
            StrategyConfig::PeakShaving(_) => StrategyKind::PeakShaving,
            StrategyConfig::TimeOfUse(_) => StrategyKind::TimeOfUse,
            StrategyConfig::Greedy(_) => StrategyKind::Greedy,
            StrategyConfig::GlobalOptimal(_) => StrategyKind::GlobalOptimal,
            StrategyConfig::Mpc(_) => StrategyKind::Mpc,
        }
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.kind().execution_mode()
    }

    /// Plans the whole `samples` window at once.
    ///
    /// Only the global optimizer plans; every other strategy returns `None`.
    ///
    /// # Errors
    ///
    /// Returns a `SolverError` if the linear program fails.
    pub fn plan(
        &self,
        samples: &[HourSample],
        battery: &BatteryMetrics,
    ) -> Option<Result<Vec<DispatchDecision>, SolverError>> {
        match self {
            StrategyConfig::GlobalOptimal(optimizer) => Some(optimizer.solve(samples, battery, 0)),
            _ => None,
        }
    }
}

impl Strategy for StrategyConfig {
    fn kind(&self) -> StrategyKind {
        StrategyConfig::kind(self)
    }

    fn decide(
        &self,
        input: &StepInput<'_>,
        battery: &BatteryMetrics,
    ) -> Result<DispatchDecision, SolverError> {
        match self {
            StrategyConfig::Naive(s) => s.decide(input, battery),
            StrategyConfig::SelfConsumption(s) => s.decide(input, battery),
            StrategyConfig::PeakShaving(s) => s.decide(input, battery),
            StrategyConfig::TimeOfUse(s) => s.decide(input, battery),
            StrategyConfig::Greedy(s) => s.decide(input, battery),
            StrategyConfig::GlobalOptimal(s) => s.decide(input, battery),
            StrategyConfig::Mpc(s) => s.decide(input, battery),
        }
    }

    fn plan(
        &self,
        samples: &[HourSample],
        battery: &BatteryMetrics,
    ) -> Option<Result<Vec<DispatchDecision>, SolverError>> {
        StrategyConfig::plan(self, samples, battery)
    }
}
