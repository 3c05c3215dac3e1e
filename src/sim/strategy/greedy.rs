use crate::devices::BatteryMetrics;
use crate::error::SolverError;
use crate::sim::power_balance::{hourly_cost, settle_grid};
use crate::sim::types::{DispatchDecision, STEP_HOURS, StepInput};

use super::{Strategy, StrategyKind};

/// One-hour myopic cost minimizer.
///
/// Scores a small set of candidate actions by their settled hourly cost
/// minus the value of the stored-energy change, and takes the cheapest.
/// Ties keep the earlier candidate, so idling wins over an equally scored
/// battery action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Greedy {
    /// Value of one kWh held in the battery (currency per kWh).
    pub stored_energy_value: f64,
}

impl Greedy {
    pub fn new(stored_energy_value: f64) -> Self {
        Self {
            stored_energy_value,
        }
    }

    /// Candidate `(charge, discharge)` pairs in tie-break order.
    fn candidates(net_kwh: f64, battery: &BatteryMetrics) -> [(f64, f64); 5] {
        let max_input = battery.max_charge_input_kwh(STEP_HOURS);
        let max_output = battery.max_discharge_output_kwh(STEP_HOURS);
        let surplus = (-net_kwh).max(0.0);
        let deficit = net_kwh.max(0.0);

        [
            (0.0, 0.0),
            (max_input, 0.0),
            (surplus.min(max_input), 0.0),
            (0.0, max_output),
            (0.0, deficit.min(max_output)),
        ]
    }
}

impl Strategy for Greedy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Greedy
    }

    fn decide(
        &self,
        input: &StepInput<'_>,
        battery: &BatteryMetrics,
    ) -> Result<DispatchDecision, SolverError> {
        let s = input.sample;
        if s.net_load_kwh() == 0.0 {
            return Ok(DispatchDecision::default());
        }
        let mut best: Option<(f64, DispatchDecision)> = None;

        for (charge, discharge) in Self::candidates(s.net_load_kwh(), battery) {
            let (buy, sell) = settle_grid(s.solar_kwh, s.load_kwh, charge, discharge);
            let stored_delta = battery.efficiency * charge - discharge;
            let score = hourly_cost(buy, sell, s.price_buy, s.price_sell)
                - self.stored_energy_value * stored_delta;

            if best.as_ref().is_none_or(|(best_score, _)| score < *best_score) {
                best = Some((
                    score,
                    DispatchDecision {
                        grid_buy_kwh: buy,
                        grid_sell_kwh: sell,
                        bat_charge_kwh: charge,
                        bat_discharge_kwh: discharge,
                    },
                ));
            }
        }

        Ok(best.map(|(_, d)| d).unwrap_or_default())
    }
}
