use common::{Error, Result};

/// Decimal places implied by a lot step size string.
///
/// "0.00100000" → 3, "1.00000000" → 0, "10.00000000" → -1 (whole tens).
/// The position of the first significant digit relative to the decimal
/// point decides the precision.
pub fn lot_precision(step_size: &str) -> Result<i32> {
    let step = step_size.trim();
    if step.is_empty() || !step.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(Error::Exchange(format!("malformed lot step size '{step_size}'")));
    }

    let dot = step.find('.').unwrap_or(step.len()) as i32;
    let significant = step
        .char_indices()
        .find(|&(_, c)| c.is_ascii_digit() && c != '0')
        .map(|(i, _)| i as i32)
        .ok_or_else(|| Error::Exchange(format!("lot step size '{step_size}' is zero")))?;

    if significant < dot {
        Ok(significant + 1 - dot)
    } else {
        Ok(significant - dot)
    }
}

/// Quote balance a buy may spend: the configured cap, never more than is
/// actually available.
pub fn buy_budget(available_quote: f64, cap: Option<f64>) -> f64 {
    match cap {
        Some(cap) => cap.min(available_quote),
        None => available_quote,
    }
}

/// Base quantity purchasable with `balance` at `ask_price`, truncated to
/// `precision` decimals. The notional `quantity * ask_price` never exceeds
/// `balance`; returns 0.0 when nothing can be bought.
pub fn compute_buy_quantity(balance: f64, ask_price: f64, precision: i32) -> f64 {
    if !(balance > 0.0) || !(ask_price > 0.0) || !balance.is_finite() {
        return 0.0;
    }

    let mut units = floor_units(balance / ask_price, precision);
    let mut quantity = from_units(units, precision);
    while units > 0.0 && quantity * ask_price > balance {
        units -= 1.0;
        quantity = from_units(units, precision);
    }
    quantity.max(0.0)
}

/// Sell the whole free balance, truncated to the lot precision.
pub fn compute_sell_quantity(free_balance: f64, precision: i32) -> f64 {
    if !(free_balance > 0.0) || !free_balance.is_finite() {
        return 0.0;
    }

    let mut units = floor_units(free_balance, precision);
    let mut quantity = from_units(units, precision);
    while units > 0.0 && quantity > free_balance {
        units -= 1.0;
        quantity = from_units(units, precision);
    }
    quantity.max(0.0)
}

/// Whole lot units in `amount`. Absorbs binary noise such as
/// 0.57 * 100 = 56.99999999999999 before flooring.
fn floor_units(amount: f64, precision: i32) -> f64 {
    let scaled = if precision >= 0 {
        amount * 10f64.powi(precision)
    } else {
        amount / 10f64.powi(-precision)
    };
    (scaled + 1e-9 * scaled.abs().max(1.0)).floor()
}

fn from_units(units: f64, precision: i32) -> f64 {
    if precision >= 0 {
        units / 10f64.powi(precision)
    } else {
        units * 10f64.powi(-precision)
    }
}
