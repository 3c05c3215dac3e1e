//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use microgrid_sim::config::ScenarioConfig;
use microgrid_sim::devices::{Battery, BatteryParams};
use microgrid_sim::sim::engine::Engine;
use microgrid_sim::sim::strategy::{StrategyConfig, StrategyKind, StrategyParams};
use microgrid_sim::sim::types::{HOURS_PER_DAY, Profiles, SimulationRun};

/// Residential battery (13.5 kWh, empty, 5 kW charge/discharge, 95% efficiency).
pub fn default_battery_params() -> BatteryParams {
    BatteryParams {
        capacity_kwh: 13.5,
        initial_soc_kwh: 0.0,
        max_charge_kw: 5.0,
        max_discharge_kw: 5.0,
        round_trip_efficiency: 0.95,
        ..BatteryParams::default()
    }
}

/// Same battery without capacity fade, so plans replay exactly.
pub fn non_degrading_battery_params() -> BatteryParams {
    BatteryParams {
        degradation_rate: 0.0,
        cycle_fade_coefficient: 0.0,
        ..default_battery_params()
    }
}

/// Constant series over `days` days.
pub fn flat_profiles(days: usize, solar_kwh: f64, load_kwh: f64, price_buy: f64, price_sell: f64) -> Profiles {
    let hours = days * HOURS_PER_DAY;
    Profiles::new(
        vec![solar_kwh; hours],
        vec![load_kwh; hours],
        vec![price_buy; hours],
        vec![price_sell; hours],
    )
    .expect("valid profiles")
}

/// 1 kWh/h load with a 5 kWh/h solar block in hours 10-14, flat prices.
pub fn solar_block_profiles(days: usize) -> Profiles {
    let hours = days * HOURS_PER_DAY;
    let solar = (0..hours)
        .map(|t| if (10..=14).contains(&(t % HOURS_PER_DAY)) { 5.0 } else { 0.0 })
        .collect();
    Profiles::new(solar, vec![1.0; hours], vec![10.0; hours], vec![0.0; hours])
        .expect("valid profiles")
}

/// Reference-day solar and load of a built-in preset over `days` days.
pub fn preset_profiles(preset: &str, days: usize) -> Profiles {
    let mut cfg = ScenarioConfig::from_preset(preset).expect("known preset");
    cfg.simulation.days = days;
    cfg.build_profiles().expect("preset builds profiles")
}

/// Strategy tunables of `preset`.
pub fn preset_strategy_params(preset: &str) -> StrategyParams {
    ScenarioConfig::from_preset(preset)
        .expect("known preset")
        .strategy
}

/// Runs `kind` with default tunables on a fresh battery.
pub fn run_strategy(profiles: &Profiles, params: &BatteryParams, kind: StrategyKind) -> SimulationRun {
    run_config(profiles, params, StrategyConfig::from_kind(kind, &StrategyParams::default()))
}

/// Runs `strategy` on a fresh battery.
pub fn run_config(profiles: &Profiles, params: &BatteryParams, strategy: StrategyConfig) -> SimulationRun {
    let battery = Battery::new(params).expect("valid battery");
    Engine::new(profiles, strategy, battery)
        .run()
        .expect("simulation should succeed")
}
