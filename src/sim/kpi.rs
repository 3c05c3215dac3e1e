//! Post-hoc KPI computation from simulation results.

use std::fmt;

use serde::Serialize;

use super::strategy::StrategyKind;
use super::types::SimulationRun;

/// Grid emission factor (kg CO2 per kWh imported).
pub const GRID_CARBON_KG_PER_KWH: f64 = 0.82;

/// Lifecycle emission factor of solar generation (kg CO2 per kWh).
pub const SOLAR_CARBON_KG_PER_KWH: f64 = 0.05;

/// Aggregate key performance indicators derived from a complete simulation run.
///
/// Computed post-hoc from the step records so reported metrics always agree
/// with the step data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiReport {
    pub strategy: StrategyKind,
    pub hours: usize,
    /// Import cost minus export revenue.
    pub total_cost: f64,
    pub import_cost: f64,
    pub export_revenue: f64,
    /// Net cost per kWh of load served.
    pub cost_per_kwh: f64,
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    pub solar_kwh: f64,
    pub load_kwh: f64,
    /// Share of load not imported from the grid (%).
    pub self_sufficiency_pct: f64,
    /// Share of solar used on site (%).
    pub self_consumption_pct: f64,
    /// Smaller of solar and load over the larger (%).
    pub load_matching_pct: f64,
    /// Grid import over load (%).
    pub grid_dependency_pct: f64,
    /// Grid export over solar (%).
    pub export_ratio_pct: f64,
    /// Largest hourly import (kWh).
    pub peak_import_kwh: f64,
    /// Largest hourly export (kWh).
    pub peak_export_kwh: f64,
    pub battery_charge_kwh: f64,
    pub battery_discharge_kwh: f64,
    pub battery_throughput_kwh: f64,
    /// Energy delivered over energy absorbed (%).
    pub battery_efficiency_pct: f64,
    pub battery_equivalent_full_cycles: f64,
    pub state_of_health_pct: f64,
    pub average_soc_kwh: f64,
    /// Stored energy lost to capacity fade (kWh).
    pub soc_clipped_kwh: f64,
    /// Largest hourly load (kWh).
    pub peak_load_kwh: f64,
    pub peak_to_average_ratio: f64,
    /// Average load over peak load (%).
    pub load_factor_pct: f64,
    pub carbon_kg: f64,
    /// Emissions saved against serving the whole load from the grid (kg).
    pub carbon_avoided_kg: f64,
    pub carbon_reduction_pct: f64,
}

impl KpiReport {
    /// Computes all KPIs from a completed run.
    ///
    /// # Arguments
    ///
    /// * `run` - Complete simulation run
    ///
    /// # Returns
    ///
    /// A `KpiReport` with all fields populated; an empty run yields zeros
    /// and full health.
    pub fn from_run(run: &SimulationRun) -> Self {
        let mut import_cost = 0.0;
        let mut export_revenue = 0.0;
        let mut grid_import = 0.0;
        let mut grid_export = 0.0;
        let mut solar = 0.0;
        let mut load = 0.0;
        let mut peak_import: f64 = 0.0;
        let mut peak_export: f64 = 0.0;
        let mut charge = 0.0;
        let mut discharge = 0.0;
        let mut soc_sum = 0.0;
        let mut clipped = 0.0;
        let mut peak_load: f64 = 0.0;

        for s in &run.steps {
            import_cost += s.price_buy * s.grid_buy_kwh;
            export_revenue += s.price_sell * s.grid_sell_kwh;
            grid_import += s.grid_buy_kwh;
            grid_export += s.grid_sell_kwh;
            solar += s.solar_kwh;
            load += s.load_kwh;
            peak_import = peak_import.max(s.grid_buy_kwh);
            peak_export = peak_export.max(s.grid_sell_kwh);
            charge += s.bat_charge_kwh;
            discharge += s.bat_discharge_kwh;
            soc_sum += s.soc_kwh;
            clipped += s.soc_clipped_kwh;
            peak_load = peak_load.max(s.load_kwh);
        }

        let total_cost = run.total_cost();
        let hours = run.steps.len();
        let capacity = run.final_battery.capacity_kwh;
        let throughput = charge + discharge;

        let self_sufficiency_pct = if load > 0.0 {
            ((1.0 - grid_import / load) * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
        let self_consumption_pct = if solar > 0.0 {
            ((solar - grid_export) / solar * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
        let carbon_kg = grid_import * GRID_CARBON_KG_PER_KWH + solar * SOLAR_CARBON_KG_PER_KWH;
        let grid_only_carbon_kg = load * GRID_CARBON_KG_PER_KWH;
        let average_load = if hours > 0 { load / hours as f64 } else { 0.0 };
        let pct = |num: f64, den: f64| if den > 0.0 { num / den * 100.0 } else { 0.0 };

        Self {
            strategy: run.strategy,
            hours,
            total_cost,
            import_cost,
            export_revenue,
            cost_per_kwh: if load > 0.0 { total_cost / load } else { 0.0 },
            grid_import_kwh: grid_import,
            grid_export_kwh: grid_export,
            solar_kwh: solar,
            load_kwh: load,
            self_sufficiency_pct,
            self_consumption_pct,
            load_matching_pct: pct(solar.min(load), solar.max(load)),
            grid_dependency_pct: pct(grid_import, load),
            export_ratio_pct: pct(grid_export, solar),
            peak_import_kwh: peak_import,
            peak_export_kwh: peak_export,
            battery_charge_kwh: charge,
            battery_discharge_kwh: discharge,
            battery_throughput_kwh: throughput,
            battery_efficiency_pct: pct(discharge, charge),
            battery_equivalent_full_cycles: if capacity > 0.0 {
                throughput / (2.0 * capacity)
            } else {
                0.0
            },
            state_of_health_pct: run
                .steps
                .last()
                .map_or(100.0, |s| s.state_of_health * 100.0),
            average_soc_kwh: if hours > 0 { soc_sum / hours as f64 } else { 0.0 },
            soc_clipped_kwh: clipped,
            peak_load_kwh: peak_load,
            peak_to_average_ratio: if average_load > 0.0 {
                peak_load / average_load
            } else {
                0.0
            },
            load_factor_pct: pct(average_load, peak_load),
            carbon_kg,
            carbon_avoided_kg: grid_only_carbon_kg - carbon_kg,
            carbon_reduction_pct: pct(grid_only_carbon_kg - carbon_kg, grid_only_carbon_kg),
        }
    }

    /// Cost saved against `baseline` (positive means cheaper).
    pub fn savings_against(&self, baseline: &KpiReport) -> f64 {
        baseline.total_cost - self.total_cost
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ({}, {} h) ---", self.strategy, self.hours)?;
        writeln!(
            f,
            "Total cost:            {:.2} (import {:.2}, export revenue {:.2})",
            self.total_cost, self.import_cost, self.export_revenue
        )?;
        writeln!(f, "Cost per kWh load:     {:.3}", self.cost_per_kwh)?;
        writeln!(
            f,
            "Grid import / export:  {:.2} / {:.2} kWh",
            self.grid_import_kwh, self.grid_export_kwh
        )?;
        writeln!(
            f,
            "Peak import / export:  {:.2} / {:.2} kWh",
            self.peak_import_kwh, self.peak_export_kwh
        )?;
        writeln!(f, "Self-sufficiency:      {:.1}%", self.self_sufficiency_pct)?;
        writeln!(f, "Self-consumption:      {:.1}%", self.self_consumption_pct)?;
        writeln!(
            f,
            "Grid dependency:       {:.1}% (export ratio {:.1}%, load matching {:.1}%)",
            self.grid_dependency_pct, self.export_ratio_pct, self.load_matching_pct
        )?;
        writeln!(
            f,
            "Load factor:           {:.1}% (peak/average {:.2})",
            self.load_factor_pct, self.peak_to_average_ratio
        )?;
        writeln!(
            f,
            "Battery throughput:    {:.2} kWh ({:.2} equiv. cycles, {:.1}% delivered)",
            self.battery_throughput_kwh,
            self.battery_equivalent_full_cycles,
            self.battery_efficiency_pct
        )?;
        writeln!(
            f,
            "Battery health:        {:.3}% (avg SoC {:.2} kWh)",
            self.state_of_health_pct, self.average_soc_kwh
        )?;
        write!(
            f,
            "Carbon:                {:.2} kg ({:.2} kg avoided, {:.1}%)",
            self.carbon_kg, self.carbon_avoided_kg, self.carbon_reduction_pct
        )
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::devices::{Battery, BatteryParams};
    use crate::sim::types::StepResult;

    fn make_result(solar: f64, load: f64, buy: f64, sell: f64, charge: f64, discharge: f64) -> StepResult {
        let cost = 10.0 * buy - 3.0 * sell;
        StepResult {
            hour: 0,
            day: 0,
            hour_of_day: 0,
            solar_kwh: solar,
            load_kwh: load,
            price_buy: 10.0,
            price_sell: 3.0,
            grid_buy_kwh: buy,
            grid_sell_kwh: sell,
            bat_charge_kwh: charge,
            bat_discharge_kwh: discharge,
            requested_charge_kwh: charge,
            requested_discharge_kwh: discharge,
            soc_kwh: 2.0,
            usable_capacity_kwh: 10.0,
            state_of_health: 0.99,
            cumulative_throughput_kwh: 0.0,
            soc_clipped_kwh: 0.0,
            cost,
            cumulative_cost: 0.0,
        }
    }

    fn make_run(steps: Vec<StepResult>) -> SimulationRun {
        SimulationRun {
            strategy: StrategyKind::SelfConsumption,
            steps,
            final_battery: Battery::new(&BatteryParams {
                capacity_kwh: 10.0,
                ..BatteryParams::default()
            })
            .expect("valid params")
            .metrics(),
        }
    }

    #[test]
    fn economic_totals() {
        let run = make_run(vec![
            make_result(0.0, 2.0, 2.0, 0.0, 0.0, 0.0),
            make_result(5.0, 1.0, 0.0, 1.0, 3.0, 0.0),
        ]);
        let kpi = KpiReport::from_run(&run);
        assert_abs_diff_eq!(kpi.import_cost, 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kpi.export_revenue, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kpi.total_cost, 17.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kpi.cost_per_kwh, 17.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn self_sufficiency_and_consumption() {
        let run = make_run(vec![
            make_result(0.0, 2.0, 1.0, 0.0, 0.0, 1.0),
            make_result(4.0, 2.0, 0.0, 1.0, 1.0, 0.0),
        ]);
        let kpi = KpiReport::from_run(&run);
        // 1 of 4 kWh imported; 1 of 4 kWh solar exported.
        assert_abs_diff_eq!(kpi.self_sufficiency_pct, 75.0, epsilon = 1e-9);
        assert_abs_diff_eq!(kpi.self_consumption_pct, 75.0, epsilon = 1e-9);
        assert_abs_diff_eq!(kpi.battery_throughput_kwh, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kpi.battery_equivalent_full_cycles, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn carbon_accounting() {
        let run = make_run(vec![make_result(3.0, 4.0, 1.0, 0.0, 0.0, 0.0)]);
        let kpi = KpiReport::from_run(&run);
        assert_abs_diff_eq!(kpi.carbon_kg, 0.82 + 0.15, epsilon = 1e-12);
        assert_abs_diff_eq!(kpi.carbon_avoided_kg, 4.0 * 0.82 - 0.97, epsilon = 1e-12);
    }

    #[test]
    fn ratio_kpis() {
        let run = make_run(vec![
            make_result(0.0, 2.0, 1.0, 0.0, 0.0, 1.0),
            make_result(4.0, 2.0, 0.0, 1.0, 1.0, 0.0),
            make_result(0.0, 4.0, 4.0, 0.0, 0.0, 0.0),
        ]);
        let kpi = KpiReport::from_run(&run);
        // Solar 4, load 8, import 5, export 1, charge 1, discharge 1.
        assert_abs_diff_eq!(kpi.load_matching_pct, 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(kpi.grid_dependency_pct, 62.5, epsilon = 1e-9);
        assert_abs_diff_eq!(kpi.export_ratio_pct, 25.0, epsilon = 1e-9);
        assert_abs_diff_eq!(kpi.battery_efficiency_pct, 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(kpi.peak_load_kwh, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kpi.peak_to_average_ratio, 1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(kpi.load_factor_pct, 200.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn savings_against_baseline() {
        let baseline = KpiReport::from_run(&make_run(vec![make_result(0.0, 3.0, 3.0, 0.0, 0.0, 0.0)]));
        let better = KpiReport::from_run(&make_run(vec![make_result(0.0, 3.0, 1.0, 0.0, 0.0, 2.0)]));
        assert_abs_diff_eq!(better.savings_against(&baseline), 20.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_run() {
        let kpi = KpiReport::from_run(&make_run(Vec::new()));
        assert_eq!(kpi.total_cost, 0.0);
        assert_eq!(kpi.state_of_health_pct, 100.0);
        assert_eq!(kpi.average_soc_kwh, 0.0);
        assert!(!format!("{kpi}").is_empty());
    }
}
