//! Investment appraisal of a simulated run.
//!
//! Scales the run's savings to a year and weighs them against the capital
//! cost of the battery and solar array.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

use super::kpi::KpiReport;
use super::types::HOURS_PER_DAY;

const DAYS_PER_YEAR: f64 = 365.0;

/// Investment parameters, as given in the `[financial]` scenario table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FinancialParams {
    /// Installed battery size (kWh); unset means the simulated battery's capacity.
    pub battery_size_kwh: Option<f64>,
    /// Installed solar size (kWp).
    pub solar_size_kw: f64,
    pub battery_cost_per_kwh: f64,
    pub solar_cost_per_kw: f64,
    /// Flat rate at which the whole load would be bought without the system.
    pub baseline_rate: f64,
    /// Annual discount rate of the NPV.
    pub discount_rate: f64,
    /// Annual operation and maintenance cost as a fraction of CAPEX.
    pub om_rate: f64,
    /// Appraisal period (years).
    pub years: u32,
}

impl Default for FinancialParams {
    fn default() -> Self {
        Self {
            battery_size_kwh: None,
            solar_size_kw: 5.0,
            battery_cost_per_kwh: 800.0,
            solar_cost_per_kw: 40_000.0,
            baseline_rate: 5.0,
            discount_rate: 0.08,
            om_rate: 0.02,
            years: 10,
        }
    }
}

impl FinancialParams {
    /// Returns every invalid parameter.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let non_negative = [
            ("financial.battery_size_kwh", self.battery_size_kwh.unwrap_or(0.0)),
            ("financial.solar_size_kw", self.solar_size_kw),
            ("financial.battery_cost_per_kwh", self.battery_cost_per_kwh),
            ("financial.solar_cost_per_kw", self.solar_cost_per_kw),
            ("financial.baseline_rate", self.baseline_rate),
            ("financial.om_rate", self.om_rate),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                errors.push(ConfigError::new(field, "must be a finite number >= 0"));
            }
        }
        if !self.discount_rate.is_finite() || self.discount_rate <= -1.0 {
            errors.push(ConfigError::new(
                "financial.discount_rate",
                "must be a finite number > -1",
            ));
        }
        if self.years == 0 {
            errors.push(ConfigError::new("financial.years", "must be > 0"));
        }
        errors
    }

    /// Fills an unset battery size with `capacity_kwh`.
    pub fn with_battery_capacity(mut self, capacity_kwh: f64) -> Self {
        self.battery_size_kwh.get_or_insert(capacity_kwh);
        self
    }
}

/// Annualized savings, payback, ROI, NPV and LCOE of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialReport {
    pub battery_capex: f64,
    pub solar_capex: f64,
    pub total_capex: f64,
    /// Cost of buying the run's whole load at the baseline rate.
    pub baseline_cost: f64,
    pub daily_savings: f64,
    pub annual_savings: f64,
    /// Years until savings repay CAPEX; `None` if the run saves nothing.
    pub payback_years: Option<f64>,
    /// Return over the appraisal period (%).
    pub roi_pct: f64,
    pub annual_om: f64,
    /// Annual savings minus O&M.
    pub annual_cash_flow: f64,
    pub npv: f64,
    /// Lifecycle cost per kWh of load served.
    pub lcoe: f64,
    pub years: u32,
}

impl FinancialReport {
    /// Appraises the run summarized by `kpi`.
    ///
    /// Savings are measured against buying the whole load at
    /// `params.baseline_rate`, averaged per simulated day and scaled to 365
    /// days. A run shorter than a day is scaled by its fraction of a day.
    pub fn from_kpi(kpi: &KpiReport, params: &FinancialParams) -> Self {
        let battery_capex = params.battery_size_kwh.unwrap_or(0.0) * params.battery_cost_per_kwh;
        let solar_capex = params.solar_size_kw * params.solar_cost_per_kw;
        let total_capex = battery_capex + solar_capex;
        let years = params.years;
        let years_f = f64::from(years);

        let days = kpi.hours as f64 / HOURS_PER_DAY as f64;
        let baseline_cost = kpi.load_kwh * params.baseline_rate;
        let (daily_savings, annual_load_kwh) = if days > 0.0 {
            (
                (baseline_cost - kpi.total_cost) / days,
                kpi.load_kwh / days * DAYS_PER_YEAR,
            )
        } else {
            (0.0, 0.0)
        };
        let annual_savings = daily_savings * DAYS_PER_YEAR;

        let payback_years = (annual_savings > 0.0).then(|| total_capex / annual_savings);
        let roi_pct = if total_capex > 0.0 {
            (annual_savings * years_f - total_capex) / total_capex * 100.0
        } else {
            0.0
        };

        let annual_om = total_capex * params.om_rate;
        let annual_cash_flow = annual_savings - annual_om;
        let npv = (1..=years).fold(-total_capex, |npv, year| {
            npv + annual_cash_flow / (1.0 + params.discount_rate).powi(year as i32)
        });

        let lifetime_load_kwh = annual_load_kwh * years_f;
        let lcoe = if lifetime_load_kwh > 0.0 {
            (total_capex + annual_om * years_f) / lifetime_load_kwh
        } else {
            0.0
        };

        Self {
            battery_capex,
            solar_capex,
            total_capex,
            baseline_cost,
            daily_savings,
            annual_savings,
            payback_years,
            roi_pct,
            annual_om,
            annual_cash_flow,
            npv,
            lcoe,
            years,
        }
    }
}

impl fmt::Display for FinancialReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Financial Report ({} years) ---", self.years)?;
        writeln!(
            f,
            "CAPEX:                 {:.0} (battery {:.0}, solar {:.0})",
            self.total_capex, self.battery_capex, self.solar_capex
        )?;
        writeln!(
            f,
            "Savings:               {:.2}/day, {:.0}/year",
            self.daily_savings, self.annual_savings
        )?;
        match self.payback_years {
            Some(years) => writeln!(f, "Payback:               {years:.1} years")?,
            None => writeln!(f, "Payback:               never")?,
        }
        writeln!(f, "ROI:                   {:.1}%", self.roi_pct)?;
        writeln!(
            f,
            "NPV:                   {:.0} (cash flow {:.0}/year after O&M {:.0})",
            self.npv, self.annual_cash_flow, self.annual_om
        )?;
        write!(f, "LCOE:                  {:.3} per kWh", self.lcoe)
    }
}
