//! Simulation engine: drives a strategy hour by hour over one battery.

use tracing::{debug, info, warn};

use crate::devices::Battery;
use crate::error::{ConfigError, SimError, SolverError};

use super::power_balance::{hourly_cost, settle_grid};
use super::strategy::{Strategy, StrategyConfig};
use super::types::{
    DispatchDecision, HOURS_PER_DAY, HourSample, Profiles, STEP_HOURS, SimulationRun, StepInput,
    StepResult,
};

/// Simulation engine owning the strategy and the battery.
///
/// Generic over `S: Strategy` for static dispatch; defaults to the
/// configurable [`StrategyConfig`]. Borrows the actual input series;
/// strategies see a separate forecast series, which defaults to the actuals
/// (perfect foresight).
pub struct Engine<'a, S: Strategy = StrategyConfig> {
    profiles: &'a Profiles,
    forecast: Vec<HourSample>,
    strategy: S,
    battery: Battery,
    cumulative_cost: f64,
}

impl<'a, S: Strategy> Engine<'a, S> {
    /// Creates a new simulation engine.
    ///
    /// # Arguments
    ///
    /// * `profiles` - Actual solar, load and price series
    /// * `strategy` - Dispatch strategy with its tunables
    /// * `battery` - Battery in its starting state
    pub fn new(profiles: &'a Profiles, strategy: S, battery: Battery) -> Self {
        Self {
            profiles,
            forecast: profiles.samples(),
            strategy,
            battery,
            cumulative_cost: 0.0,
        }
    }

    /// Replaces the series strategies plan against.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if `forecast` does not cover the same hours.
    pub fn with_forecast(mut self, forecast: &Profiles) -> Result<Self, ConfigError> {
        if forecast.len() != self.profiles.len() {
            return Err(ConfigError::new(
                "forecast",
                format!(
                    "has {} hours, expected {}",
                    forecast.len(),
                    self.profiles.len()
                ),
            ));
        }
        self.forecast = forecast.samples();
        Ok(self)
    }

    /// Applies one decision to hour `hour` and records the outcome.
    ///
    /// A decision requesting both charge and discharge is netted first so
    /// only one direction reaches the battery. The grid is then settled as
    /// the residual of the realized battery flows, which keeps the hour
    /// balanced whatever the strategy asked for.
    ///
    /// # Panics
    ///
    /// Panics if `hour` is outside the horizon.
    pub fn apply(&mut self, hour: usize, decision: &DispatchDecision) -> StepResult {
        let sample = self.profiles.sample(hour);
        let requested = decision.netted(self.battery.efficiency());

        let charged = self.battery.charge(requested.bat_charge_kwh, STEP_HOURS);
        let discharged = self.battery.discharge(requested.bat_discharge_kwh, STEP_HOURS);

        let (grid_buy_kwh, grid_sell_kwh) =
            settle_grid(sample.solar_kwh, sample.load_kwh, charged, discharged);
        let cost = hourly_cost(grid_buy_kwh, grid_sell_kwh, sample.price_buy, sample.price_sell);
        self.cumulative_cost += cost;

        let degradation = self.battery.step_degradation();

        let result = StepResult {
            hour,
            day: hour / HOURS_PER_DAY,
            hour_of_day: hour % HOURS_PER_DAY,
            solar_kwh: sample.solar_kwh,
            load_kwh: sample.load_kwh,
            price_buy: sample.price_buy,
            price_sell: sample.price_sell,
            grid_buy_kwh,
            grid_sell_kwh,
            bat_charge_kwh: charged,
            bat_discharge_kwh: discharged,
            requested_charge_kwh: requested.bat_charge_kwh,
            requested_discharge_kwh: requested.bat_discharge_kwh,
            soc_kwh: self.battery.soc_kwh(),
            usable_capacity_kwh: degradation.usable_capacity_kwh,
            state_of_health: degradation.state_of_health,
            cumulative_throughput_kwh: self.battery.cumulative_throughput_kwh(),
            soc_clipped_kwh: degradation.soc_clipped_kwh,
            cost,
            cumulative_cost: self.cumulative_cost,
        };
        debug!(strategy = %self.strategy.kind(), "{result}");
        result
    }

    /// Asks the strategy for hour `hour` and applies its decision.
    ///
    /// # Errors
    ///
    /// Returns a `SolverError` if an optimizer-backed strategy fails.
    pub fn step(&mut self, hour: usize) -> Result<StepResult, SolverError> {
        let input = StepInput {
            hour,
            sample: self.profiles.sample(hour),
            forecast: &self.forecast[hour..],
        };
        let decision = self.strategy.decide(&input, &self.battery.metrics())?;
        Ok(self.apply(hour, &decision))
    }

    /// Simulates every hour of the horizon.
    ///
    /// The battery continues from its current state; cumulative cost starts
    /// at zero. The global optimizer plans once over the forecast series and
    /// the plan is then replayed through [`Engine::apply`].
    ///
    /// # Errors
    ///
    /// Returns `SimError::Solver` on the first solver failure; no partial
    /// run is returned.
    pub fn run(&mut self) -> Result<SimulationRun, SimError> {
        let kind = self.strategy.kind();
        let total = self.profiles.len();
        let mut steps = Vec::with_capacity(total);
        self.cumulative_cost = 0.0;

        let plan = self
            .strategy
            .plan(&self.forecast, &self.battery.metrics())
            .transpose()
            .inspect_err(|e| warn!(strategy = %kind, error = %e, "run aborted"))?;

        match plan {
            Some(plan) => {
                for (hour, decision) in plan.iter().enumerate().take(total) {
                    steps.push(self.apply(hour, decision));
                }
            }
            None => {
                for hour in 0..total {
                    let step = self
                        .step(hour)
                        .inspect_err(|e| warn!(strategy = %kind, error = %e, "run aborted"))?;
                    steps.push(step);
                }
            }
        }

        let run = SimulationRun {
            strategy: kind,
            steps,
            final_battery: self.battery.metrics(),
        };
        info!(
            strategy = %kind,
            hours = run.len(),
            total_cost = run.total_cost(),
            grid_buy_kwh = run.total_grid_buy_kwh(),
            grid_sell_kwh = run.total_grid_sell_kwh(),
            state_of_health = run.final_battery.state_of_health,
            "simulation finished"
        );
        Ok(run)
    }

    /// Returns a reference to the battery.
    pub fn battery(&self) -> &Battery {
        &self.battery
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Consumes the engine and hands back the battery for a follow-up run.
    pub fn into_battery(self) -> Battery {
        self.battery
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::devices::BatteryParams;
    use crate::sim::strategy::{StrategyKind, StrategyParams};

    fn flat_profiles(hours: usize, solar: f64, load: f64) -> Profiles {
        Profiles::new(
            vec![solar; hours],
            vec![load; hours],
            vec![10.0; hours],
            vec![3.0; hours],
        )
        .expect("valid profiles")
    }

    fn battery(initial_soc_kwh: f64) -> Battery {
        Battery::new(&BatteryParams {
            capacity_kwh: 10.0,
            initial_soc_kwh,
            ..BatteryParams::default()
        })
        .expect("valid params")
    }

    fn strategy(kind: StrategyKind) -> StrategyConfig {
        StrategyConfig::from_kind(kind, &StrategyParams::default())
    }

    /// Buys the deficit until `fail_at`, where its solver gives up.
    struct FailsAtHour {
        fail_at: usize,
        in_plan: bool,
    }

    impl FailsAtHour {
        fn error(&self) -> SolverError {
            SolverError {
                hour: self.fail_at,
                horizon: 6,
                reason: "primal infeasible".into(),
            }
        }
    }

    impl Strategy for FailsAtHour {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Mpc
        }

        fn decide(
            &self,
            input: &StepInput<'_>,
            _battery: &crate::devices::BatteryMetrics,
        ) -> Result<DispatchDecision, SolverError> {
            if input.hour == self.fail_at {
                return Err(self.error());
            }
            Ok(DispatchDecision::grid_only(input.net_load_kwh()))
        }

        fn plan(
            &self,
            _samples: &[HourSample],
            _battery: &crate::devices::BatteryMetrics,
        ) -> Option<Result<Vec<DispatchDecision>, SolverError>> {
            self.in_plan.then(|| Err(self.error()))
        }
    }

    #[test]
    fn apply_settles_grid_as_residual() {
        let profiles = flat_profiles(1, 0.0, 2.0);
        let mut engine = Engine::new(&profiles, strategy(StrategyKind::Naive), battery(1.0));

        // Strategy asks for more than the battery holds.
        let decision = DispatchDecision {
            bat_discharge_kwh: 3.0,
            ..DispatchDecision::default()
        };
        let r = engine.apply(0, &decision);
        assert_eq!(r.requested_discharge_kwh, 3.0);
        assert_eq!(r.bat_discharge_kwh, 1.0);
        assert_eq!(r.grid_buy_kwh, 1.0);
        assert_eq!(r.cost, 10.0);
        assert_eq!(r.balance_error_kwh(), 0.0);
    }

    #[test]
    fn apply_nets_simultaneous_charge_and_discharge() {
        let profiles = flat_profiles(1, 0.0, 1.0);
        let mut engine = Engine::new(&profiles, strategy(StrategyKind::Naive), battery(5.0));
        let decision = DispatchDecision {
            bat_charge_kwh: 1.0,
            bat_discharge_kwh: 3.0,
            ..DispatchDecision::default()
        };
        let r = engine.apply(0, &decision);
        assert_eq!(r.bat_charge_kwh, 0.0);
        assert_abs_diff_eq!(r.bat_discharge_kwh, 3.0 - 0.95, epsilon = 1e-12);
        assert_abs_diff_eq!(r.balance_error_kwh(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn run_tracks_cumulative_cost() {
        let profiles = flat_profiles(48, 0.0, 1.0);
        let mut engine = Engine::new(&profiles, strategy(StrategyKind::Naive), battery(0.0));
        let run = engine.run().expect("naive never fails");
        assert_eq!(run.len(), 48);
        assert_eq!(run.steps[47].day, 1);
        assert_eq!(run.steps[47].hour_of_day, 23);
        assert_abs_diff_eq!(run.steps[47].cumulative_cost, 480.0, epsilon = 1e-9);
        assert_eq!(run.daily_costs(), vec![240.0, 240.0]);
    }

    #[test]
    fn global_mode_replays_a_plan() {
        let profiles = flat_profiles(24, 0.0, 1.0);
        let mut engine = Engine::new(
            &profiles,
            strategy(StrategyKind::GlobalOptimal),
            battery(5.0),
        );
        let run = engine.run().expect("solvable");
        assert_eq!(run.strategy, StrategyKind::GlobalOptimal);
        assert_eq!(run.len(), 24);
        // Stored energy displaces purchases at a flat price.
        assert!(run.total_grid_buy_kwh() < 24.0 - 4.0);
    }

    #[test]
    fn solver_failure_aborts_run_at_its_hour() {
        let profiles = flat_profiles(24, 0.0, 1.0);
        let failing = FailsAtHour {
            fail_at: 7,
            in_plan: false,
        };
        let mut engine = Engine::new(&profiles, failing, battery(0.0));

        let err = engine.run().expect_err("hour 7 fails");
        assert!(matches!(&err, SimError::Solver(e) if e.hour == 7 && e.horizon == 6));
        // Hours before the failure were applied, nothing after it.
        assert_eq!(engine.battery().metrics().hours_elapsed, 7);
    }

    #[test]
    fn failed_global_plan_applies_nothing() {
        let profiles = flat_profiles(24, 0.0, 1.0);
        let failing = FailsAtHour {
            fail_at: 0,
            in_plan: true,
        };
        let mut engine = Engine::new(&profiles, failing, battery(2.0));

        let err = engine.run().expect_err("plan fails");
        assert!(matches!(err, SimError::Solver(e) if e.hour == 0));
        assert_eq!(engine.battery().metrics().hours_elapsed, 0);
        assert_eq!(engine.battery().soc_kwh(), 2.0);
    }

    #[test]
    fn forecast_length_must_match() {
        let profiles = flat_profiles(24, 0.0, 1.0);
        let short = flat_profiles(12, 0.0, 1.0);
        let result = Engine::new(&profiles, strategy(StrategyKind::Mpc), battery(0.0))
            .with_forecast(&short);
        assert!(matches!(result, Err(e) if e.field == "forecast"));
    }

    #[test]
    fn into_battery_keeps_end_state() {
        let profiles = flat_profiles(3, 0.0, 1.0);
        let mut engine = Engine::new(
            &profiles,
            strategy(StrategyKind::SelfConsumption),
            battery(5.0),
        );
        engine.run().expect("rule strategy never fails");
        let battery = engine.into_battery();
        assert_abs_diff_eq!(battery.soc_kwh(), 2.0, epsilon = 1e-12);
        assert_eq!(battery.metrics().hours_elapsed, 3);
    }
}
