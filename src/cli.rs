use std::path::PathBuf;

use clap::Parser;

use microgrid_sim::sim::strategy::StrategyKind;

/// Hourly microgrid dispatch simulator.
///
/// Without `--scenario` or `--preset` the baseline preset is used.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Load the scenario from a TOML file.
    #[clap(long, conflicts_with = "preset")]
    pub scenario: Option<PathBuf>,

    /// Use a built-in preset (baseline, flat_rate, dynamic).
    #[clap(long)]
    pub preset: Option<String>,

    /// Override the strategy chosen in the scenario.
    #[clap(long, value_parser = parse_strategy)]
    pub strategy: Option<StrategyKind>,

    /// Override the number of simulated days.
    #[clap(long)]
    pub days: Option<usize>,

    /// Run all strategies and rank them.
    #[clap(long)]
    pub compare: bool,

    /// Forecast solar and load as the previous day's actuals instead of
    /// using perfect foresight.
    #[clap(long)]
    pub persistence_forecast: bool,

    /// Export per-hour results to CSV.
    #[clap(long)]
    pub telemetry_out: Option<PathBuf>,

    /// Export the KPI summary to JSON.
    #[clap(long)]
    pub summary_json: Option<PathBuf>,

    /// Suppress the per-hour table on stdout.
    #[clap(long, short)]
    pub quiet: bool,
}

fn parse_strategy(s: &str) -> Result<StrategyKind, String> {
    s.parse::<StrategyKind>().map_err(|e| e.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions, clap::Error> {
        CliOptions::try_parse_from(std::iter::once("microgrid-sim").chain(args.iter().copied()))
    }

    #[test]
    fn supports_scenario_cli() {
        let opts = parse(&["--scenario", "scenario.toml"]).expect("parse should succeed");
        assert_eq!(
            opts.scenario.as_deref().and_then(|p| p.to_str()),
            Some("scenario.toml")
        );
        assert!(opts.preset.is_none());
    }

    #[test]
    fn supports_preset_and_overrides() {
        let opts = parse(&["--preset", "dynamic", "--strategy", "mpc", "--days", "2", "--compare"])
            .expect("parse should succeed");
        assert_eq!(opts.preset.as_deref(), Some("dynamic"));
        assert_eq!(opts.strategy, Some(StrategyKind::Mpc));
        assert_eq!(opts.days, Some(2));
        assert!(opts.compare);
    }

    #[test]
    fn scenario_and_preset_are_exclusive() {
        assert!(parse(&["--scenario", "a.toml", "--preset", "baseline"]).is_err());
    }

    #[test]
    fn unknown_strategy_rejected() {
        assert!(parse(&["--strategy", "cheapest"]).is_err());
    }
}
