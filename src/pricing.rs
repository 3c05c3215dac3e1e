//! Buy and sell price tables.

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sim::types::HOURS_PER_DAY;

/// Time-of-use buy prices for one day: off-peak, morning peak, mid-peak,
/// evening peak, mid-peak.
pub const TOU_DAY: [f64; HOURS_PER_DAY] = [
    3.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0, // 00-06
    12.0, 12.0, 12.0, // 07-09
    5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, // 10-16
    12.0, 12.0, 12.0, 12.0, // 17-20
    5.0, 5.0, 5.0, // 21-23
];

/// Hours of day whose dynamic price is scaled by [`DYNAMIC_PEAK_MULTIPLIER`].
pub const DYNAMIC_PEAK_HOURS: [usize; 7] = [7, 8, 9, 17, 18, 19, 20];

pub const DYNAMIC_PEAK_MULTIPLIER: f64 = 1.5;

/// Lowest value the dynamic random walk may reach.
pub const DYNAMIC_PRICE_FLOOR: f64 = 2.0;

/// Buy-price model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceModel {
    Tou,
    Flat,
    Dynamic,
}

/// Pricing parameters, as given in the `[pricing]` scenario table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PricingConfig {
    pub model: PriceModel,
    /// Buy price of the flat model.
    pub flat_rate: f64,
    /// Feed-in tariff, constant over the horizon.
    pub sell_price: f64,
    /// Starting point of the dynamic random walk.
    pub base_price: f64,
    /// Standard deviation of one hourly dynamic step.
    pub volatility: f64,
    /// Seed of the dynamic random walk.
    pub seed: u64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            model: PriceModel::Tou,
            flat_rate: 5.0,
            sell_price: 3.0,
            base_price: 5.0,
            volatility: 0.3,
            seed: 42,
        }
    }
}

impl PricingConfig {
    /// Returns every invalid pricing parameter.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("pricing.flat_rate", self.flat_rate),
            ("pricing.sell_price", self.sell_price),
            ("pricing.base_price", self.base_price),
        ] {
            if !value.is_finite() {
                errors.push(ConfigError::new(field, "must be a finite number"));
            }
        }
        if !self.volatility.is_finite() || self.volatility < 0.0 {
            errors.push(ConfigError::new(
                "pricing.volatility",
                "must be a finite number >= 0",
            ));
        }
        errors
    }

    /// Buy prices for `hours` hours.
    pub fn buy_prices(&self, hours: usize) -> Vec<f64> {
        match self.model {
            PriceModel::Tou => tou_prices(hours),
            PriceModel::Flat => vec![self.flat_rate; hours],
            PriceModel::Dynamic => {
                dynamic_prices(self.base_price, self.volatility, hours, self.seed)
            }
        }
    }

    /// Sell prices for `hours` hours.
    pub fn sell_prices(&self, hours: usize) -> Vec<f64> {
        vec![self.sell_price; hours]
    }
}

/// Time-of-use table repeated over `hours` hours.
pub fn tou_prices(hours: usize) -> Vec<f64> {
    TOU_DAY.iter().copied().cycle().take(hours).collect()
}

/// Seeded random-walk buy prices.
///
/// The walk never drops below [`DYNAMIC_PRICE_FLOOR`] and continues across
/// day boundaries. Peak hours report the walk scaled by
/// [`DYNAMIC_PEAK_MULTIPLIER`]; the scaling does not feed back into the walk.
///
/// # Arguments
///
/// * `base_price` - Starting price
/// * `volatility` - Standard deviation of each hourly step
/// * `hours` - Number of prices to generate
/// * `seed` - Random seed for reproducibility
pub fn dynamic_prices(base_price: f64, volatility: f64, hours: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut walk = base_price.max(DYNAMIC_PRICE_FLOOR);

    (0..hours)
        .map(|hour| {
            walk = (walk + gaussian_noise(&mut rng, volatility)).max(DYNAMIC_PRICE_FLOOR);
            if DYNAMIC_PEAK_HOURS.contains(&(hour % HOURS_PER_DAY)) {
                walk * DYNAMIC_PEAK_MULTIPLIER
            } else {
                walk
            }
        })
        .collect()
}

/// Box-Muller normal sample with zero mean.
fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }
    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z * std_dev
}
