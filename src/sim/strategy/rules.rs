//! Rule-based strategies: naive, self-consumption, peak shaving, time-of-use.

use crate::devices::BatteryMetrics;
use crate::error::SolverError;
use crate::sim::types::{DispatchDecision, STEP_HOURS, StepInput};

use super::{Strategy, StrategyKind};

/// Grid covers every deficit and takes every surplus; the battery idles.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct NaiveStrategy;

impl Strategy for NaiveStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Naive
    }

    fn decide(
        &self,
        input: &StepInput<'_>,
        _battery: &BatteryMetrics,
    ) -> Result<DispatchDecision, SolverError> {
        Ok(DispatchDecision::grid_only(input.net_load_kwh()))
    }
}

/// Stores surplus solar first and covers deficits from the battery first.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SelfConsumption;

impl Strategy for SelfConsumption {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SelfConsumption
    }

    fn decide(
        &self,
        input: &StepInput<'_>,
        battery: &BatteryMetrics,
    ) -> Result<DispatchDecision, SolverError> {
        Ok(self_consume(input.net_load_kwh(), battery))
    }
}

fn self_consume(net_kwh: f64, battery: &BatteryMetrics) -> DispatchDecision {
    if net_kwh < 0.0 {
        let charge = (-net_kwh).min(battery.max_charge_input_kwh(STEP_HOURS));
        DispatchDecision::charging(net_kwh, charge)
    } else if net_kwh > 0.0 {
        let discharge = net_kwh.min(battery.max_discharge_output_kwh(STEP_HOURS));
        DispatchDecision::discharging(net_kwh, discharge)
    } else {
        DispatchDecision::default()
    }
}

/// Discharges only the part of net load above a threshold, keeping a reserve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakShaving {
    pub threshold_kw: f64,
    /// Fraction of usable capacity never discharged.
    pub reserve_soc_fraction: f64,
}

impl PeakShaving {
    pub fn new(threshold_kw: f64, reserve_soc_fraction: f64) -> Self {
        Self {
            threshold_kw,
            reserve_soc_fraction,
        }
    }
}

impl Strategy for PeakShaving {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PeakShaving
    }

    fn decide(
        &self,
        input: &StepInput<'_>,
        battery: &BatteryMetrics,
    ) -> Result<DispatchDecision, SolverError> {
        let net = input.net_load_kwh();
        let threshold_kwh = self.threshold_kw * STEP_HOURS;

        if net > threshold_kwh {
            let reserve_kwh = self.reserve_soc_fraction * battery.usable_capacity_kwh;
            let available = (battery.soc_kwh - reserve_kwh).max(0.0);
            let discharge = (net - threshold_kwh)
                .min(available)
                .min(battery.discharge_limit_kw() * STEP_HOURS);
            return Ok(DispatchDecision::discharging(net, discharge));
        }
        if net < 0.0 {
            let charge = (-net).min(battery.max_charge_input_kwh(STEP_HOURS));
            return Ok(DispatchDecision::charging(net, charge));
        }
        Ok(DispatchDecision::grid_only(net))
    }
}

/// Tariff period of one hour, as seen by [`TimeOfUse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourClass {
    Peak,
    OffPeak,
    Shoulder,
}

/// Charges off-peak, discharges on-peak, holds in between.
///
/// With both hour lists empty the class is derived from the buy price
/// relative to the mean of the known forecast window.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeOfUse {
    pub peak_hours: Vec<usize>,
    pub off_peak_hours: Vec<usize>,
    /// Fraction of usable capacity to reach by grid charging off-peak.
    pub grid_charge_target: f64,
}

/// Relative price band treated as equal to the window mean.
const PRICE_EPSILON: f64 = 1e-9;

impl TimeOfUse {
    pub fn new(peak_hours: Vec<usize>, off_peak_hours: Vec<usize>, grid_charge_target: f64) -> Self {
        Self {
            peak_hours,
            off_peak_hours,
            grid_charge_target,
        }
    }

    /// Classifies `input.hour`.
    pub fn classify(&self, input: &StepInput<'_>) -> HourClass {
        if self.peak_hours.is_empty() && self.off_peak_hours.is_empty() {
            return classify_by_price(input);
        }

        let hour = input.hour_of_day();
        if self.peak_hours.contains(&hour) {
            HourClass::Peak
        } else if self.off_peak_hours.contains(&hour) {
            HourClass::OffPeak
        } else {
            HourClass::Shoulder
        }
    }
}

fn classify_by_price(input: &StepInput<'_>) -> HourClass {
    if input.forecast.is_empty() {
        return HourClass::Shoulder;
    }
    let mean =
        input.forecast.iter().map(|s| s.price_buy).sum::<f64>() / input.forecast.len() as f64;
    let band = PRICE_EPSILON * mean.abs().max(1.0);
    let price = input.sample.price_buy;

    if price > mean + band {
        HourClass::Peak
    } else if price < mean - band {
        HourClass::OffPeak
    } else {
        HourClass::Shoulder
    }
}

impl Strategy for TimeOfUse {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TimeOfUse
    }

    fn decide(
        &self,
        input: &StepInput<'_>,
        battery: &BatteryMetrics,
    ) -> Result<DispatchDecision, SolverError> {
        let net = input.net_load_kwh();
        if net == 0.0 {
            return Ok(DispatchDecision::default());
        }
        let max_input = battery.max_charge_input_kwh(STEP_HOURS);

        let decision = match self.classify(input) {
            HourClass::Peak if net > 0.0 => {
                let discharge = net.min(battery.max_discharge_output_kwh(STEP_HOURS));
                DispatchDecision::discharging(net, discharge)
            }
            HourClass::Peak => DispatchDecision::grid_only(net),
            HourClass::OffPeak => {
                let surplus = (-net).max(0.0);
                let target_kwh = self.grid_charge_target * battery.usable_capacity_kwh;
                let top_up = (target_kwh - battery.soc_kwh).max(0.0) / battery.efficiency;
                let charge = surplus.max(top_up).min(max_input);
                DispatchDecision::charging(net, charge)
            }
            HourClass::Shoulder if net < 0.0 => {
                DispatchDecision::charging(net, (-net).min(max_input))
            }
            HourClass::Shoulder => DispatchDecision::grid_only(net),
        };
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::sim::strategy::test_support::{metrics, sample};
    use crate::sim::types::HourSample;

    fn input(hour: usize, s: HourSample, forecast: &[HourSample]) -> StepInput<'_> {
        StepInput {
            hour,
            sample: s,
            forecast,
        }
    }

    #[test]
    fn naive_buys_deficit_and_sells_surplus() {
        let battery = metrics(5.0);
        let deficit = sample(0.0, 2.0, 5.0);
        let d = NaiveStrategy
            .decide(&input(0, deficit, &[deficit]), &battery)
            .unwrap();
        assert_eq!(d, DispatchDecision::grid_only(2.0));

        let surplus = sample(3.0, 1.0, 5.0);
        let d = NaiveStrategy
            .decide(&input(0, surplus, &[surplus]), &battery)
            .unwrap();
        assert_eq!(d.grid_sell_kwh, 2.0);
        assert_eq!(d.bat_charge_kwh, 0.0);
    }

    #[test]
    fn self_consumption_charges_surplus_up_to_limit() {
        let battery = metrics(0.0);
        let s = sample(8.0, 1.0, 5.0);
        let d = SelfConsumption.decide(&input(12, s, &[s]), &battery).unwrap();
        assert_eq!(d.bat_charge_kwh, 5.0);
        assert_eq!(d.grid_sell_kwh, 2.0);
        assert_eq!(d.grid_buy_kwh, 0.0);
    }

    #[test]
    fn self_consumption_discharges_deficit_limited_by_soc() {
        let battery = metrics(0.5);
        let s = sample(0.0, 2.0, 5.0);
        let d = SelfConsumption.decide(&input(20, s, &[s]), &battery).unwrap();
        assert_eq!(d.bat_discharge_kwh, 0.5);
        assert_eq!(d.grid_buy_kwh, 1.5);
    }

    #[test]
    fn self_consumption_zero_net_is_idle() {
        let battery = metrics(5.0);
        let s = sample(1.0, 1.0, 5.0);
        let d = SelfConsumption.decide(&input(9, s, &[s]), &battery).unwrap();
        assert_eq!(d, DispatchDecision::default());
    }

    #[test]
    fn peak_shaving_discharges_excess_only() {
        let battery = metrics(8.0);
        let s = sample(0.0, 7.0, 5.0);
        let d = PeakShaving::new(5.0, 0.1)
            .decide(&input(18, s, &[s]), &battery)
            .unwrap();
        assert_eq!(d.bat_discharge_kwh, 2.0);
        assert_eq!(d.grid_buy_kwh, 5.0);
    }

    #[test]
    fn peak_shaving_respects_reserve() {
        let battery = metrics(1.5);
        let s = sample(0.0, 9.0, 5.0);
        let d = PeakShaving::new(5.0, 0.1)
            .decide(&input(18, s, &[s]), &battery)
            .unwrap();
        assert_abs_diff_eq!(d.bat_discharge_kwh, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(d.grid_buy_kwh, 8.5, epsilon = 1e-12);
    }

    #[test]
    fn peak_shaving_below_threshold_buys() {
        let battery = metrics(8.0);
        let s = sample(0.0, 3.0, 5.0);
        let d = PeakShaving::new(5.0, 0.1)
            .decide(&input(18, s, &[s]), &battery)
            .unwrap();
        assert_eq!(d, DispatchDecision::grid_only(3.0));
    }

    #[test]
    fn tou_grid_charges_off_peak() {
        let tou = TimeOfUse::new(vec![18], vec![2], 1.0);
        let battery = metrics(7.0);
        let s = sample(0.0, 1.0, 3.0);
        let d = tou.decide(&input(2, s, &[s]), &battery).unwrap();
        assert_eq!(d.bat_charge_kwh, 3.0);
        assert_eq!(d.grid_buy_kwh, 4.0);
    }

    #[test]
    fn tou_balanced_off_peak_hour_skips_top_up() {
        let tou = TimeOfUse::new(vec![18], vec![2], 1.0);
        let s = sample(1.5, 1.5, 3.0);
        let d = tou.decide(&input(2, s, &[s]), &metrics(7.0)).unwrap();
        assert_eq!(d, DispatchDecision::default());
    }

    #[test]
    fn tou_discharges_on_peak_and_holds_on_shoulder() {
        let tou = TimeOfUse::new(vec![18], vec![2], 1.0);
        let battery = metrics(7.0);
        let s = sample(0.0, 2.0, 12.0);
        let d = tou.decide(&input(42, s, &[s]), &battery).unwrap();
        assert_eq!(d.bat_discharge_kwh, 2.0);

        let d = tou.decide(&input(12, s, &[s]), &battery).unwrap();
        assert_eq!(d, DispatchDecision::grid_only(2.0));
    }

    #[test]
    fn tou_classifies_by_price_without_hour_lists() {
        let tou = TimeOfUse::new(Vec::new(), Vec::new(), 1.0);
        let window = [
            sample(0.0, 1.0, 3.0),
            sample(0.0, 1.0, 5.0),
            sample(0.0, 1.0, 12.0),
        ];
        assert_eq!(tou.classify(&input(0, window[0], &window)), HourClass::OffPeak);
        assert_eq!(tou.classify(&input(2, window[2], &window[2..])), HourClass::Shoulder);
        assert_eq!(tou.classify(&input(2, window[2], &window)), HourClass::Peak);
    }
}
