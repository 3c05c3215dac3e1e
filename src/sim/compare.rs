//! Runs several strategies over the same inputs and ranks them.

use std::thread;

use tracing::info;

use crate::devices::{Battery, BatteryParams};
use crate::error::{ConfigError, SimError};

use super::engine::Engine;
use super::strategy::{StrategyConfig, StrategyKind};
use super::types::{Profiles, SimulationRun};

/// Outcome of one strategy within a comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonEntry {
    pub kind: StrategyKind,
    pub outcome: Result<SimulationRun, SimError>,
}

impl ComparisonEntry {
    pub fn run(&self) -> Option<&SimulationRun> {
        self.outcome.as_ref().ok()
    }

    pub fn total_cost(&self) -> Option<f64> {
        self.run().map(SimulationRun::total_cost)
    }
}

/// Results of every compared strategy, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyComparison {
    pub entries: Vec<ComparisonEntry>,
}

impl StrategyComparison {
    pub fn get(&self, kind: StrategyKind) -> Option<&ComparisonEntry> {
        self.entries.iter().find(|e| e.kind == kind)
    }

    /// Successful runs by ascending total cost.
    pub fn ranking(&self) -> Vec<&SimulationRun> {
        let mut runs: Vec<&SimulationRun> = self.entries.iter().filter_map(|e| e.run()).collect();
        runs.sort_by(|a, b| a.total_cost().total_cmp(&b.total_cost()));
        runs
    }

    /// Cheapest successful run.
    pub fn best(&self) -> Option<&SimulationRun> {
        self.ranking().into_iter().next()
    }

    /// Entries whose run failed.
    pub fn failures(&self) -> impl Iterator<Item = (StrategyKind, &SimError)> {
        self.entries
            .iter()
            .filter_map(|e| e.outcome.as_ref().err().map(|err| (e.kind, err)))
    }
}

/// Runs every strategy on its own copy of a fresh battery, in parallel.
///
/// # Errors
///
/// Returns a `ConfigError` if the battery parameters are invalid; nothing
/// is simulated in that case. Solver failures of individual strategies are
/// recorded in their entry and do not affect the others.
pub fn compare_strategies(
    profiles: &Profiles,
    battery_params: &BatteryParams,
    strategies: &[StrategyConfig],
) -> Result<StrategyComparison, ConfigError> {
    let battery = Battery::new(battery_params)?;

    let entries = thread::scope(|scope| {
        let handles: Vec<_> = strategies
            .iter()
            .map(|strategy| {
                let battery = battery.clone();
                let strategy = strategy.clone();
                scope.spawn(move || {
                    let kind = strategy.kind();
                    let outcome = Engine::new(profiles, strategy, battery).run();
                    ComparisonEntry { kind, outcome }
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(entry) => entry,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect::<Vec<_>>()
    });

    let comparison = StrategyComparison { entries };
    if let Some(best) = comparison.best() {
        info!(
            strategies = strategies.len(),
            best = %best.strategy,
            best_cost = best.total_cost(),
            "comparison finished"
        );
    }
    Ok(comparison)
}
