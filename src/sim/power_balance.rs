//! Energy balance on the site bus and hourly settlement.

/// Settles the grid as the residual of one hour's bus flows.
///
/// Sources are solar and battery discharge, sinks are load and battery
/// charge. Whatever the battery did not cover is imported; whatever it did
/// not absorb is exported. At most one of the two is non-zero.
///
/// # Arguments
///
/// * `solar_kwh` - Solar generation during the hour
/// * `load_kwh` - Site consumption during the hour
/// * `charge_kwh` - Energy the battery absorbed
/// * `discharge_kwh` - Energy the battery delivered
///
/// # Returns
///
/// `(grid_buy_kwh, grid_sell_kwh)`
pub fn settle_grid(
    solar_kwh: f64,
    load_kwh: f64,
    charge_kwh: f64,
    discharge_kwh: f64,
) -> (f64, f64) {
    let net = (load_kwh + charge_kwh) - (solar_kwh + discharge_kwh);
    if net > 0.0 {
        (net, 0.0)
    } else if net < 0.0 {
        (0.0, -net)
    } else {
        (0.0, 0.0)
    }
}

/// Sources minus sinks; zero for a balanced hour.
pub fn balance_error(
    solar_kwh: f64,
    load_kwh: f64,
    grid_buy_kwh: f64,
    grid_sell_kwh: f64,
    charge_kwh: f64,
    discharge_kwh: f64,
) -> f64 {
    (solar_kwh + grid_buy_kwh + discharge_kwh) - (load_kwh + charge_kwh + grid_sell_kwh)
}

/// Import cost minus export revenue for one hour.
pub fn hourly_cost(grid_buy_kwh: f64, grid_sell_kwh: f64, price_buy: f64, price_sell: f64) -> f64 {
    price_buy * grid_buy_kwh - price_sell * grid_sell_kwh
}
