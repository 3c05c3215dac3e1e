//! Integration tests for hand-computed reference scenarios.

mod common;

use approx::assert_abs_diff_eq;
use microgrid_sim::devices::Battery;
use microgrid_sim::sim::engine::Engine;
use microgrid_sim::sim::strategy::{StrategyConfig, StrategyKind, StrategyParams};
use microgrid_sim::sim::types::HOURS_PER_DAY;

#[test]
fn naive_flat_price_day() {
    let profiles = common::flat_profiles(1, 0.0, 1.0, 10.0, 0.0);
    let run = common::run_strategy(&profiles, &common::default_battery_params(), StrategyKind::Naive);

    assert_eq!(run.len(), 24);
    assert_abs_diff_eq!(run.total_grid_buy_kwh(), 24.0, epsilon = 1e-9);
    assert_abs_diff_eq!(run.total_cost(), 240.0, epsilon = 1e-9);
    assert!(run.steps.iter().all(|s| s.soc_kwh == 0.0));
    assert_eq!(run.final_battery.state_of_health, 1.0);
}

#[test]
fn self_consumption_stores_solar_block_and_covers_evening() {
    let profiles = common::solar_block_profiles(1);
    let run = common::run_strategy(
        &profiles,
        &common::default_battery_params(),
        StrategyKind::SelfConsumption,
    );
    let s = &run.steps;

    // Morning: empty battery, everything bought.
    for h in 0..10 {
        assert_abs_diff_eq!(s[h].grid_buy_kwh, 1.0, epsilon = 1e-12);
        assert_eq!(s[h].bat_discharge_kwh, 0.0);
    }

    // Solar block: 4 kWh/h surplus goes into the battery until it is full.
    for h in 10..13 {
        assert_abs_diff_eq!(s[h].bat_charge_kwh, 4.0, epsilon = 1e-12);
        assert_eq!(s[h].grid_sell_kwh, 0.0);
    }
    assert_abs_diff_eq!(s[12].soc_kwh, 3.0 * 4.0 * 0.95, epsilon = 1e-6);
    assert!(s[13].bat_charge_kwh < 4.0);
    assert!(s[13].grid_sell_kwh > 0.0);
    assert!(s[13].soc_kwh > 13.0);

    // Evening: battery covers the load before any grid purchase.
    for h in 15..HOURS_PER_DAY {
        assert_abs_diff_eq!(s[h].bat_discharge_kwh, 1.0, epsilon = 1e-12);
        assert_eq!(s[h].grid_buy_kwh, 0.0);
    }
    assert!(s[23].soc_kwh > 3.0);
}

#[test]
fn two_day_run_continues_from_one_day_end_state() {
    let two_days = common::solar_block_profiles(2);
    let one_day = two_days.day(0).expect("first day");
    let params = common::default_battery_params();

    for kind in [StrategyKind::SelfConsumption, StrategyKind::Greedy, StrategyKind::TimeOfUse] {
        let short = common::run_strategy(&one_day, &params, kind);
        let long = common::run_strategy(&two_days, &params, kind);

        assert_eq!(long.len(), 48);
        let short_end = short.steps.last().expect("24 steps");
        let long_day_one_end = &long.steps[HOURS_PER_DAY - 1];
        assert_eq!(short_end.soc_kwh, long_day_one_end.soc_kwh, "{kind}");
        assert_eq!(short_end.state_of_health, long_day_one_end.state_of_health, "{kind}");
        assert_eq!(short.final_battery.soc_kwh, long_day_one_end.soc_kwh, "{kind}");
    }
}

#[test]
fn into_battery_carries_state_into_next_day() {
    let two_days = common::solar_block_profiles(2);
    let params = common::default_battery_params();
    let strategy = || StrategyConfig::from_kind(StrategyKind::SelfConsumption, &StrategyParams::default());

    let day0 = two_days.day(0).expect("first day");
    let day1 = two_days.day(1).expect("second day");

    let mut first = Engine::new(&day0, strategy(), Battery::new(&params).expect("valid battery"));
    first.run().expect("rule strategy never fails");
    let carried = first.into_battery();
    let second = Engine::new(&day1, strategy(), carried)
        .run()
        .expect("rule strategy never fails");

    let continuous = common::run_strategy(&two_days, &params, StrategyKind::SelfConsumption);
    for (split, whole) in second.steps.iter().zip(&continuous.steps[HOURS_PER_DAY..]) {
        assert_eq!(split.soc_kwh, whole.soc_kwh);
        assert_eq!(split.grid_buy_kwh, whole.grid_buy_kwh);
        assert_eq!(split.state_of_health, whole.state_of_health);
    }
}

#[test]
fn degradation_clip_is_reported_not_hidden() {
    // Full battery, heavy cycling: capacity fade eventually clips a full SoC.
    let profiles = common::solar_block_profiles(3);
    let run = common::run_strategy(
        &profiles,
        &common::default_battery_params(),
        StrategyKind::SelfConsumption,
    );
    let clipped: f64 = run.steps.iter().map(|s| s.soc_clipped_kwh).sum();
    assert!(clipped > 0.0);
    for s in &run.steps {
        assert!(s.soc_kwh <= s.usable_capacity_kwh);
    }
}
