//! CSV telemetry and JSON summary export.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::sim::kpi::KpiReport;
use crate::sim::strategy::StrategyKind;
use crate::sim::types::StepResult;

/// Column header for CSV telemetry export.
const HEADER: &str = "strategy,hour,day,hour_of_day,solar_kwh,load_kwh,price_buy,price_sell,\
                       grid_buy_kwh,grid_sell_kwh,bat_charge_kwh,bat_discharge_kwh,\
                       soc_kwh,usable_capacity_kwh,state_of_health,soc_clipped_kwh,\
                       cost,cumulative_cost";

/// Exports step results to a CSV file at the given path.
///
/// Writes a header row followed by one data row per step. Produces
/// deterministic output for identical inputs.
///
/// # Arguments
///
/// * `strategy` - Strategy that produced the run
/// * `results` - Complete simulation step results
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(strategy: StrategyKind, results: &[StepResult], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(strategy, results, buf)
}

/// Writes step results as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(
    strategy: StrategyKind,
    results: &[StepResult],
    writer: impl Write,
) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in results {
        wtr.write_record(&[
            strategy.name().to_string(),
            r.hour.to_string(),
            r.day.to_string(),
            r.hour_of_day.to_string(),
            format!("{:.4}", r.solar_kwh),
            format!("{:.4}", r.load_kwh),
            format!("{:.4}", r.price_buy),
            format!("{:.4}", r.price_sell),
            format!("{:.6}", r.grid_buy_kwh),
            format!("{:.6}", r.grid_sell_kwh),
            format!("{:.6}", r.bat_charge_kwh),
            format!("{:.6}", r.bat_discharge_kwh),
            format!("{:.6}", r.soc_kwh),
            format!("{:.6}", r.usable_capacity_kwh),
            format!("{:.8}", r.state_of_health),
            format!("{:.6}", r.soc_clipped_kwh),
            format!("{:.4}", r.cost),
            format!("{:.4}", r.cumulative_cost),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct Summary<'a> {
    best: Option<StrategyKind>,
    runs: &'a [KpiReport],
}

/// Exports KPI reports as a JSON summary file.
///
/// # Errors
///
/// Returns an `io::Error` if file creation, serialization, or writing fails.
pub fn export_summary_json(reports: &[KpiReport], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_summary_json(reports, io::BufWriter::new(file))
}

/// Writes KPI reports as pretty-printed JSON, naming the cheapest strategy.
///
/// # Errors
///
/// Returns an `io::Error` if serialization or writing fails.
pub fn write_summary_json(reports: &[KpiReport], mut writer: impl Write) -> io::Result<()> {
    let best = reports
        .iter()
        .min_by(|a, b| a.total_cost.total_cmp(&b.total_cost))
        .map(|r| r.strategy);
    serde_json::to_writer_pretty(
        &mut writer,
        &Summary {
            best,
            runs: reports,
        },
    )?;
    writeln!(writer)?;
    writer.flush()
}
