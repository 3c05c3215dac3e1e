//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::devices::BatteryParams;
use crate::error::ConfigError;
use crate::forecast::NaiveForecast;
use crate::io::profiles::read_profiles_csv;
use crate::pricing::{PriceModel, PricingConfig};
use crate::sim::financial::FinancialParams;
use crate::sim::strategy::{StrategyConfig, StrategyKind, StrategyParams};
use crate::sim::types::{HOURS_PER_DAY, Profiles, SimConfig};
use crate::sim::validator::DEFAULT_TOLERANCE;

/// Reference-day solar generation (kWh per hour) of a ~5 kWp array.
pub const REFERENCE_SOLAR_KWH: [f64; HOURS_PER_DAY] = [
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.2, 0.8, 1.8, 2.9, 3.8, 4.4, //
    4.6, 4.4, 3.8, 2.9, 1.8, 0.8, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0,
];

/// Reference-day household load (kWh per hour) with morning and evening peaks.
pub const REFERENCE_LOAD_KWH: [f64; HOURS_PER_DAY] = [
    0.6, 0.5, 0.5, 0.5, 0.5, 0.7, 1.2, 1.8, 1.6, 1.2, 1.0, 1.0, //
    1.1, 1.0, 1.0, 1.1, 1.4, 2.2, 2.8, 3.0, 2.6, 1.9, 1.2, 0.8,
];

/// Top-level scenario configuration parsed from TOML.
///
/// All tables have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Horizon, strategy choice, validation tolerance.
    pub simulation: SimulationConfig,
    pub battery: BatteryParams,
    pub pricing: PricingConfig,
    /// Strategy tunables.
    pub strategy: StrategyParams,
    /// Solar and load input tables.
    pub profiles: ProfilesConfig,
    /// Investment appraisal parameters.
    pub financial: FinancialParams,
}

/// Simulation horizon and global parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Number of days to simulate (must be > 0).
    pub days: usize,
    /// Strategy run when not comparing.
    pub strategy: StrategyKind,
    /// Absolute tolerance of the post-run validator.
    pub tolerance: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            days: 1,
            strategy: StrategyKind::GlobalOptimal,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Solar and load tables.
///
/// Each table holds either one day (24 values, repeated over the horizon) or
/// the full horizon. A `csv` file, when given, replaces both tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfilesConfig {
    pub solar_kwh: Vec<f64>,
    pub load_kwh: Vec<f64>,
    /// CSV file with columns `hour,solar_kwh,load_kwh`. A relative path in a
    /// scenario file is taken relative to that file's directory.
    pub csv: Option<PathBuf>,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            solar_kwh: REFERENCE_SOLAR_KWH.to_vec(),
            load_kwh: REFERENCE_LOAD_KWH.to_vec(),
            csv: None,
        }
    }
}

/// Checks one table against the horizon and returns it tiled to full length.
fn expand_table(field: &str, table: &[f64], hours: usize) -> Result<Vec<f64>, ConfigError> {
    if table.len() != HOURS_PER_DAY && table.len() != hours {
        return Err(ConfigError::new(
            field,
            format!(
                "has {} values, expected {HOURS_PER_DAY} or {hours}",
                table.len()
            ),
        ));
    }
    Ok(NaiveForecast.forecast(table, hours))
}

impl ScenarioConfig {
    /// Returns the baseline scenario: reference day under time-of-use prices.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Returns the flat-rate preset: same site, constant buy price.
    pub fn flat_rate() -> Self {
        Self {
            pricing: PricingConfig {
                model: PriceModel::Flat,
                ..PricingConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns the dynamic preset: seeded random-walk prices over three days,
    /// with hour classification derived from prices.
    pub fn dynamic() -> Self {
        Self {
            simulation: SimulationConfig {
                days: 3,
                ..SimulationConfig::default()
            },
            pricing: PricingConfig {
                model: PriceModel::Dynamic,
                ..PricingConfig::default()
            },
            strategy: StrategyParams {
                peak_hours: Vec::new(),
                off_peak_hours: Vec::new(),
                ..StrategyParams::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "flat_rate", "dynamic"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "flat_rate" => Ok(Self::flat_rate()),
            "dynamic" => Ok(Self::dynamic()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new(
                "scenario",
                format!("cannot read \"{}\": {e}", path.display()),
            )
        })?;
        let mut scenario = Self::from_toml_str(&content)?;
        if let (Some(csv), Some(dir)) = (scenario.profiles.csv.as_mut(), path.parent()) {
            if csv.is_relative() {
                *csv = dir.join(&*csv);
            }
        }
        Ok(scenario)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid. Profile tables
    /// loaded from CSV are checked by [`ScenarioConfig::build_profiles`].
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if s.days == 0 {
            errors.push(ConfigError::new("simulation.days", "must be > 0"));
        }
        if !(s.tolerance > 0.0) || !s.tolerance.is_finite() {
            errors.push(ConfigError::new(
                "simulation.tolerance",
                "must be a finite number > 0",
            ));
        }

        if let Err(e) = self.battery.validate() {
            errors.push(e);
        }
        errors.extend(self.pricing.validate());
        errors.extend(self.strategy.validate());
        errors.extend(self.financial.validate());

        if self.profiles.csv.is_none() && s.days > 0 {
            let hours = s.days * HOURS_PER_DAY;
            for (field, table) in [
                ("profiles.solar_kwh", &self.profiles.solar_kwh),
                ("profiles.load_kwh", &self.profiles.load_kwh),
            ] {
                if let Err(e) = expand_table(field, table, hours) {
                    errors.push(e);
                } else if table.iter().any(|v| !v.is_finite() || *v < 0.0) {
                    errors.push(ConfigError::new(field, "values must be finite and >= 0"));
                }
            }
        }

        errors
    }

    /// Simulation horizon.
    ///
    /// # Panics
    ///
    /// Panics if `simulation.days` is zero; call [`ScenarioConfig::validate`] first.
    pub fn sim_config(&self) -> SimConfig {
        SimConfig::new(self.simulation.days)
    }

    /// Builds the input series for the configured horizon.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the CSV file cannot be read, a table has
    /// the wrong length, or a value is invalid.
    pub fn build_profiles(&self) -> Result<Profiles, ConfigError> {
        if self.simulation.days == 0 {
            return Err(ConfigError::new("simulation.days", "must be > 0"));
        }
        let hours = self.simulation.days * HOURS_PER_DAY;

        let (solar, load) = match &self.profiles.csv {
            Some(path) => {
                let tables = read_profiles_csv(path)?;
                (tables.solar_kwh, tables.load_kwh)
            }
            None => (self.profiles.solar_kwh.clone(), self.profiles.load_kwh.clone()),
        };

        Profiles::new(
            expand_table("profiles.solar_kwh", &solar, hours)?,
            expand_table("profiles.load_kwh", &load, hours)?,
            self.pricing.buy_prices(hours),
            self.pricing.sell_prices(hours),
        )
    }

    /// The strategy selected in `[simulation]`, with the `[strategy]` tunables.
    pub fn strategy_config(&self) -> StrategyConfig {
        StrategyConfig::from_kind(self.simulation.strategy, &self.strategy)
    }

    /// The `[financial]` table, with an unset battery size taken from `[battery]`.
    pub fn financial_params(&self) -> FinancialParams {
        self.financial
            .clone()
            .with_battery_capacity(self.battery.capacity_kwh)
    }

    /// Every strategy, with the `[strategy]` tunables.
    pub fn all_strategies(&self) -> Vec<StrategyConfig> {
        StrategyConfig::all(&self.strategy)
    }
}
