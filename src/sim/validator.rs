//! Post-hoc consistency checks over completed runs.

use std::fmt;

use serde::Serialize;

use crate::devices::BatteryParams;

use super::compare::StrategyComparison;
use super::strategy::StrategyKind;
use super::types::{STEP_HOURS, SimulationRun};

/// Absolute tolerance for energy and cost checks.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Relative slack allowed when a strategy beats the global optimum.
pub const RANKING_RELATIVE_TOLERANCE: f64 = 1e-3;

/// Absolute floor of the ranking slack (currency).
pub const RANKING_ABSOLUTE_TOLERANCE: f64 = 0.05;

/// What a violation broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    EnergyBalance,
    SocBelowZero,
    SocAboveCapacity,
    ChargeLimit,
    DischargeLimit,
    CumulativeCost,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViolationKind::EnergyBalance => "energy balance",
            ViolationKind::SocBelowZero => "SoC below zero",
            ViolationKind::SocAboveCapacity => "SoC above usable capacity",
            ViolationKind::ChargeLimit => "charge above power limit",
            ViolationKind::DischargeLimit => "discharge above power limit",
            ViolationKind::CumulativeCost => "cumulative cost mismatch",
        };
        f.write_str(name)
    }
}

/// One failed check at one hour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Violation {
    pub hour: usize,
    pub kind: ViolationKind,
    /// Amount by which the check was missed.
    pub magnitude: f64,
}

/// Every violation found in one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub strategy: StrategyKind,
    pub hours_checked: usize,
    pub max_balance_error_kwh: f64,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn count(&self, kind: ViolationKind) -> usize {
        self.violations.iter().filter(|v| v.kind == kind).count()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            return write!(
                f,
                "{}: OK ({} hours, max balance error {:.2e} kWh)",
                self.strategy, self.hours_checked, self.max_balance_error_kwh
            );
        }
        writeln!(
            f,
            "{}: {} violation(s) in {} hours",
            self.strategy,
            self.violations.len(),
            self.hours_checked
        )?;
        for v in &self.violations {
            writeln!(f, "  hour {:>4}: {} by {:.3e}", v.hour, v.kind, v.magnitude)?;
        }
        Ok(())
    }
}

/// A strategy that beat the global optimum by more than the ranking slack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankingViolation {
    pub strategy: StrategyKind,
    pub strategy_cost: f64,
    pub optimal_cost: f64,
}

/// Checks runs against the physical and accounting invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct Validator {
    max_charge_kwh: f64,
    max_discharge_kwh: f64,
    tolerance: f64,
}

impl Validator {
    /// Creates a validator for a battery built from `params`.
    pub fn new(params: &BatteryParams) -> Self {
        Self {
            max_charge_kwh: params.max_charge_kw * STEP_HOURS,
            max_discharge_kwh: params.max_discharge_kw * STEP_HOURS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Checks every hour of `run` and collects all violations.
    pub fn validate(&self, run: &SimulationRun) -> ValidationReport {
        let tol = self.tolerance;
        let mut violations = Vec::new();
        let mut max_balance_error_kwh: f64 = 0.0;
        let mut running_cost = 0.0;

        for s in &run.steps {
            let mut check = |kind, magnitude: f64| {
                if magnitude > tol {
                    violations.push(Violation {
                        hour: s.hour,
                        kind,
                        magnitude,
                    });
                }
            };

            let balance = s.balance_error_kwh().abs();
            max_balance_error_kwh = max_balance_error_kwh.max(balance);
            check(ViolationKind::EnergyBalance, balance);
            check(ViolationKind::SocBelowZero, -s.soc_kwh);
            check(ViolationKind::SocAboveCapacity, s.soc_kwh - s.usable_capacity_kwh);
            check(ViolationKind::ChargeLimit, s.bat_charge_kwh - self.max_charge_kwh);
            check(
                ViolationKind::DischargeLimit,
                s.bat_discharge_kwh - self.max_discharge_kwh,
            );

            running_cost += s.cost;
            let cost_tol = tol * running_cost.abs().max(1.0);
            let cost_error = (s.cumulative_cost - running_cost).abs();
            if cost_error > cost_tol {
                violations.push(Violation {
                    hour: s.hour,
                    kind: ViolationKind::CumulativeCost,
                    magnitude: cost_error,
                });
            }
        }

        ValidationReport {
            strategy: run.strategy,
            hours_checked: run.steps.len(),
            max_balance_error_kwh,
            violations,
        }
    }

    /// Checks that no strategy beats the global optimum beyond the ranking slack.
    ///
    /// Returns no violations if the global optimizer is absent or failed.
    pub fn validate_comparison(&self, comparison: &StrategyComparison) -> Vec<RankingViolation> {
        let Some(optimal_cost) = comparison
            .get(StrategyKind::GlobalOptimal)
            .and_then(|e| e.total_cost())
        else {
            return Vec::new();
        };
        let slack = (RANKING_RELATIVE_TOLERANCE * optimal_cost.abs()).max(RANKING_ABSOLUTE_TOLERANCE);

        comparison
            .entries
            .iter()
            .filter(|e| e.kind != StrategyKind::GlobalOptimal)
            .filter_map(|e| {
                let cost = e.total_cost()?;
                (cost < optimal_cost - slack).then_some(RankingViolation {
                    strategy: e.kind,
                    strategy_cost: cost,
                    optimal_cost,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{Battery, BatteryParams};
    use crate::error::{SimError, SolverError};
    use crate::sim::compare::ComparisonEntry;
    use crate::sim::types::StepResult;

    fn step(hour: usize, buy: f64, cost: f64, cumulative_cost: f64) -> StepResult {
        StepResult {
            hour,
            day: 0,
            hour_of_day: hour,
            solar_kwh: 0.0,
            load_kwh: buy,
            price_buy: 10.0,
            price_sell: 3.0,
            grid_buy_kwh: buy,
            grid_sell_kwh: 0.0,
            bat_charge_kwh: 0.0,
            bat_discharge_kwh: 0.0,
            requested_charge_kwh: 0.0,
            requested_discharge_kwh: 0.0,
            soc_kwh: 0.0,
            usable_capacity_kwh: 10.0,
            state_of_health: 1.0,
            cumulative_throughput_kwh: 0.0,
            soc_clipped_kwh: 0.0,
            cost,
            cumulative_cost,
        }
    }

    fn run(kind: StrategyKind, steps: Vec<StepResult>) -> SimulationRun {
        let params = BatteryParams::default();
        SimulationRun {
            strategy: kind,
            steps,
            final_battery: Battery::new(&params).expect("valid params").metrics(),
        }
    }

    #[test]
    fn consistent_run_passes() {
        let r = run(
            StrategyKind::Naive,
            vec![step(0, 1.0, 10.0, 10.0), step(1, 2.0, 20.0, 30.0)],
        );
        let report = Validator::new(&BatteryParams::default()).validate(&r);
        assert!(report.passed(), "{report}");
        assert_eq!(report.hours_checked, 2);
    }

    #[test]
    fn collects_every_violation() {
        let mut unbalanced = step(0, 1.0, 10.0, 10.0);
        unbalanced.grid_buy_kwh = 1.5;
        let mut overfull = step(1, 1.0, 10.0, 20.0);
        overfull.soc_kwh = 10.5;
        let mut fast = step(2, 1.0, 10.0, 30.0);
        fast.bat_charge_kwh = 6.0;
        fast.grid_buy_kwh = 7.0;
        let wrong_cost = step(3, 1.0, 10.0, 99.0);

        let r = run(
            StrategyKind::Greedy,
            vec![unbalanced, overfull, fast, wrong_cost],
        );
        let report = Validator::new(&BatteryParams::default()).validate(&r);

        assert!(!report.passed());
        assert_eq!(report.count(ViolationKind::EnergyBalance), 1);
        assert_eq!(report.count(ViolationKind::SocAboveCapacity), 1);
        assert_eq!(report.count(ViolationKind::ChargeLimit), 1);
        assert_eq!(report.count(ViolationKind::CumulativeCost), 1);
        assert_eq!(report.violations[0].hour, 0);
        assert!((report.max_balance_error_kwh - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ranking_flags_strategy_beating_optimum() {
        let comparison = StrategyComparison {
            entries: vec![
                ComparisonEntry {
                    kind: StrategyKind::GlobalOptimal,
                    outcome: Ok(run(
                        StrategyKind::GlobalOptimal,
                        vec![step(0, 1.0, 10.0, 10.0)],
                    )),
                },
                ComparisonEntry {
                    kind: StrategyKind::Greedy,
                    outcome: Ok(run(StrategyKind::Greedy, vec![step(0, 0.5, 5.0, 5.0)])),
                },
                ComparisonEntry {
                    kind: StrategyKind::Naive,
                    outcome: Ok(run(
                        StrategyKind::Naive,
                        vec![step(0, 1.0, 9.99, 9.99)],
                    )),
                },
            ],
        };
        let violations = Validator::new(&BatteryParams::default()).validate_comparison(&comparison);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].strategy, StrategyKind::Greedy);
    }

    #[test]
    fn ranking_check_skipped_when_optimizer_failed() {
        let comparison = StrategyComparison {
            entries: vec![
                ComparisonEntry {
                    kind: StrategyKind::GlobalOptimal,
                    outcome: Err(SimError::Solver(SolverError {
                        hour: 0,
                        horizon: 24,
                        reason: "numerical error".into(),
                    })),
                },
                ComparisonEntry {
                    kind: StrategyKind::Greedy,
                    outcome: Ok(run(StrategyKind::Greedy, vec![step(0, 0.5, 5.0, 5.0)])),
                },
            ],
        };
        let violations = Validator::new(&BatteryParams::default()).validate_comparison(&comparison);
        assert!(violations.is_empty());
    }
}
