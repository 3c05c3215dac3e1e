//! Microgrid simulator entry point: CLI wiring and config-driven runs.

mod cli;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use microgrid_sim::config::ScenarioConfig;
use microgrid_sim::devices::Battery;
use microgrid_sim::forecast::NaiveForecast;
use microgrid_sim::io::export::{export_csv, export_summary_json};
use microgrid_sim::sim::compare::compare_strategies;
use microgrid_sim::sim::engine::Engine;
use microgrid_sim::sim::financial::{FinancialParams, FinancialReport};
use microgrid_sim::sim::kpi::KpiReport;
use microgrid_sim::sim::strategy::StrategyKind;
use microgrid_sim::sim::types::{Profiles, SimulationRun};
use microgrid_sim::sim::validator::Validator;

use crate::cli::CliOptions;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the scenario (`--scenario` first, then `--preset`, then baseline)
/// and applies command-line overrides.
fn load_scenario(cli: &CliOptions) -> Result<ScenarioConfig> {
    let mut scenario = match (&cli.scenario, &cli.preset) {
        (Some(path), _) => ScenarioConfig::from_toml_file(path)?,
        (None, Some(name)) => ScenarioConfig::from_preset(name)?,
        (None, None) => ScenarioConfig::baseline(),
    };

    if let Some(kind) = cli.strategy {
        scenario.simulation.strategy = kind;
    }
    if let Some(days) = cli.days {
        scenario.simulation.days = days;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        bail!("scenario has {} configuration error(s)", errors.len());
    }
    Ok(scenario)
}

/// Runs the configured strategy once.
fn run_single(
    scenario: &ScenarioConfig,
    profiles: &Profiles,
    forecast: Option<&Profiles>,
) -> Result<SimulationRun> {
    let battery = Battery::new(&scenario.battery)?;
    let mut engine = Engine::new(profiles, scenario.strategy_config(), battery);
    if let Some(forecast) = forecast {
        engine = engine.with_forecast(forecast)?;
    }
    let run = engine
        .run()
        .with_context(|| format!("strategy {} failed", scenario.simulation.strategy))?;
    Ok(run)
}

fn print_run(run: &SimulationRun, validator: &Validator, financial: &FinancialParams, quiet: bool) {
    if !quiet {
        for r in &run.steps {
            println!("{r}");
        }
    }
    let kpi = KpiReport::from_run(run);
    println!("\n{kpi}");
    println!("\n{}", FinancialReport::from_kpi(&kpi, financial));
    println!("{}", validator.validate(run));
}

fn main() -> Result<()> {
    init_tracing();
    let cli = CliOptions::parse();
    let scenario = load_scenario(&cli)?;

    let profiles = scenario.build_profiles()?;
    let forecast = if cli.persistence_forecast {
        Some(NaiveForecast.persistence(&profiles)?)
    } else {
        None
    };
    let validator = Validator::new(&scenario.battery).with_tolerance(scenario.simulation.tolerance);
    let financial = scenario.financial_params();
    info!(
        hours = profiles.len(),
        days = scenario.simulation.days,
        strategy = %scenario.simulation.strategy,
        compare = cli.compare,
        "scenario loaded"
    );

    let mut reports = Vec::new();

    if cli.compare {
        if forecast.is_some() {
            eprintln!("note: --persistence-forecast is ignored with --compare");
        }
        let comparison =
            compare_strategies(&profiles, &scenario.battery, &scenario.all_strategies())?;

        for (kind, err) in comparison.failures() {
            eprintln!("{kind}: {err}");
        }

        let baseline = comparison
            .get(StrategyKind::Naive)
            .and_then(|e| e.run())
            .map(KpiReport::from_run);

        println!("--- Strategy ranking ---");
        for (rank, run) in comparison.ranking().into_iter().enumerate() {
            let kpi = KpiReport::from_run(run);
            let savings = baseline
                .as_ref()
                .map_or(0.0, |b| kpi.savings_against(b));
            let report = validator.validate(run);
            println!(
                "{:>2}. {:<17} cost {:>9.2}  savings {:>8.2}  self-sufficiency {:>5.1}%  SoH {:.3}%  {}",
                rank + 1,
                run.strategy.name(),
                kpi.total_cost,
                savings,
                kpi.self_sufficiency_pct,
                kpi.state_of_health_pct,
                if report.passed() { "valid" } else { "INVALID" },
            );
            reports.push(kpi);
        }

        let ranking_violations = validator.validate_comparison(&comparison);
        if ranking_violations.is_empty() {
            println!("Ranking sanity: OK");
        } else {
            for v in &ranking_violations {
                println!(
                    "Ranking sanity: {} ({:.2}) beats global_optimal ({:.2})",
                    v.strategy, v.strategy_cost, v.optimal_cost
                );
            }
        }

        if let Some(best) = comparison.best() {
            let kpi = KpiReport::from_run(best);
            println!("\n{}", FinancialReport::from_kpi(&kpi, &financial));
        }

        if let Some(path) = &cli.telemetry_out {
            if let Some(best) = comparison.best() {
                export_csv(best.strategy, &best.steps, path)
                    .with_context(|| format!("failed to write CSV to {}", path.display()))?;
                eprintln!("Telemetry of {} written to {}", best.strategy, path.display());
            }
        }
    } else {
        let run = run_single(&scenario, &profiles, forecast.as_ref())?;
        print_run(&run, &validator, &financial, cli.quiet);
        reports.push(KpiReport::from_run(&run));

        if let Some(path) = &cli.telemetry_out {
            export_csv(run.strategy, &run.steps, path)
                .with_context(|| format!("failed to write CSV to {}", path.display()))?;
            eprintln!("Telemetry written to {}", path.display());
        }
    }

    if let Some(path) = &cli.summary_json {
        export_summary_json(&reports, path)
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
        eprintln!("Summary written to {}", path.display());
    }

    Ok(())
}
