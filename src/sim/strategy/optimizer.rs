//! Linear-programming strategies: full-horizon optimum and rolling horizon.

use std::time::Instant;

use good_lp::{
    Expression, ProblemVariables, Solution, SolverModel, Variable, clarabel, constraint, variable,
};
use tracing::{debug, warn};

use crate::devices::BatteryMetrics;
use crate::error::SolverError;
use crate::sim::types::{DispatchDecision, HourSample, STEP_HOURS, StepInput};

use super::{Strategy, StrategyKind};

/// Solver output below this magnitude is treated as zero.
const SNAP_EPSILON: f64 = 1e-7;

/// Cost-minimizing plan over the whole horizon with perfect foresight.
///
/// Solves one linear program with fixed efficiency and capacity taken from
/// the battery snapshot. Degradation during the horizon is not modelled.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct LinearOptimizer;

impl LinearOptimizer {
    /// Plans every hour of `samples`.
    ///
    /// # Arguments
    ///
    /// * `samples` - Inputs of the window, first entry is the first hour
    /// * `battery` - Battery state at the start of the window
    /// * `start_hour` - Absolute hour of `samples[0]`, used in errors and logs
    ///
    /// # Errors
    ///
    /// Returns a `SolverError` if the program is infeasible, unbounded, or
    /// the solver fails.
    pub fn solve(
        &self,
        samples: &[HourSample],
        battery: &BatteryMetrics,
        start_hour: usize,
    ) -> Result<Vec<DispatchDecision>, SolverError> {
        let horizon = samples.len();
        if horizon == 0 {
            return Ok(Vec::new());
        }

        let eta = battery.efficiency;
        let charge_cap = (battery.charge_limit_kw() * STEP_HOURS).max(0.0);
        let discharge_cap = (battery.discharge_limit_kw() * STEP_HOURS).max(0.0);
        let usable = battery.usable_capacity_kwh.max(0.0);
        let initial_soc = battery.soc_kwh.clamp(0.0, usable);

        if let Some(offset) = samples.iter().position(|s| s.price_sell > s.price_buy) {
            warn!(
                hour = start_hour + offset,
                "sell price above buy price; plan may import and export in the same hour"
            );
        }

        let mut vars = ProblemVariables::new();
        let mut buy: Vec<Variable> = Vec::with_capacity(horizon);
        let mut sell: Vec<Variable> = Vec::with_capacity(horizon);
        let mut charge: Vec<Variable> = Vec::with_capacity(horizon);
        let mut discharge: Vec<Variable> = Vec::with_capacity(horizon);
        let mut soc: Vec<Variable> = Vec::with_capacity(horizon);

        for s in samples {
            // Balanced hours stay idle: no charge and no export.
            let balanced = s.net_load_kwh() == 0.0;
            let hour_charge_cap = if balanced { 0.0 } else { charge_cap };
            let hour_sell_cap = if balanced { 0.0 } else { s.solar_kwh + discharge_cap };
            buy.push(vars.add(variable().min(0.0).max(s.load_kwh + charge_cap)));
            sell.push(vars.add(variable().min(0.0).max(hour_sell_cap)));
            charge.push(vars.add(variable().min(0.0).max(hour_charge_cap)));
            discharge.push(vars.add(variable().min(0.0).max(discharge_cap)));
            soc.push(vars.add(variable().min(0.0).max(usable)));
        }

        let mut objective = Expression::default();
        for (t, s) in samples.iter().enumerate() {
            objective += s.price_buy * buy[t];
            objective -= s.price_sell * sell[t];
        }

        let mut model = vars.minimise(objective).using(clarabel);

        for (t, s) in samples.iter().enumerate() {
            // solar + buy + discharge = load + charge + sell
            model = model.with(constraint!(
                buy[t] + discharge[t] - sell[t] - charge[t] == s.load_kwh - s.solar_kwh
            ));

            if t == 0 {
                model = model.with(constraint!(
                    soc[0] - eta * charge[0] + discharge[0] == initial_soc
                ));
            } else {
                model = model.with(constraint!(
                    soc[t] - soc[t - 1] - eta * charge[t] + discharge[t] == 0.0
                ));
            }
        }

        let started = Instant::now();
        let solution = model.solve().map_err(|e| {
            warn!(hour = start_hour, horizon, error = %e, "linear program failed");
            SolverError {
                hour: start_hour,
                horizon,
                reason: e.to_string(),
            }
        })?;
        debug!(
            hour = start_hour,
            horizon,
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "linear program solved"
        );

        let plan = (0..horizon)
            .map(|t| DispatchDecision {
                grid_buy_kwh: snap(solution.value(buy[t])),
                grid_sell_kwh: snap(solution.value(sell[t])),
                bat_charge_kwh: snap(solution.value(charge[t])).min(charge_cap),
                bat_discharge_kwh: snap(solution.value(discharge[t])).min(discharge_cap),
            })
            .collect();
        Ok(plan)
    }
}

/// Clears solver noise and negative round-off.
fn snap(value: f64) -> f64 {
    if value.abs() < SNAP_EPSILON || !value.is_finite() {
        0.0
    } else {
        value.max(0.0)
    }
}

/// Replaces the forecast of the current hour with its actual inputs.
fn window_with_actuals(input: &StepInput<'_>, len: usize) -> Vec<HourSample> {
    let mut window: Vec<HourSample> = input.forecast.iter().take(len).copied().collect();
    match window.first_mut() {
        Some(first) => *first = input.sample,
        None => window.push(input.sample),
    }
    window
}

impl Strategy for LinearOptimizer {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GlobalOptimal
    }

    /// Plans the rest of the horizon and commits the first hour.
    ///
    /// The engine normally drives this strategy through [`Strategy::plan`]
    /// once per run; this per-hour form re-plans every call.
    fn decide(
        &self,
        input: &StepInput<'_>,
        battery: &BatteryMetrics,
    ) -> Result<DispatchDecision, SolverError> {
        let window = window_with_actuals(input, input.forecast.len());
        let plan = self.solve(&window, battery, input.hour)?;
        Ok(plan.first().copied().unwrap_or_default())
    }

    fn plan(
        &self,
        samples: &[HourSample],
        battery: &BatteryMetrics,
    ) -> Option<Result<Vec<DispatchDecision>, SolverError>> {
        Some(self.solve(samples, battery, 0))
    }
}

/// Rolling-horizon optimizer.
///
/// Each hour solves the linear program over the next `horizon_hours` hours
/// (fewer near the end), using actual inputs for the current hour and the
/// forecast beyond it, and commits only the first decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MpcStrategy {
    pub horizon_hours: usize,
}

impl MpcStrategy {
    pub fn new(horizon_hours: usize) -> Self {
        Self {
            horizon_hours: horizon_hours.max(1),
        }
    }
}

impl Strategy for MpcStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Mpc
    }

    fn decide(
        &self,
        input: &StepInput<'_>,
        battery: &BatteryMetrics,
    ) -> Result<DispatchDecision, SolverError> {
        let window = window_with_actuals(input, self.horizon_hours);
        let plan = LinearOptimizer.solve(&window, battery, input.hour)?;
        Ok(plan.first().copied().unwrap_or_default())
    }
}
