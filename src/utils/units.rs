//! Display helpers for raw token amounts.

use rust_decimal::{Decimal, RoundingStrategy};

/// Render a raw `amount` with `decimals` native decimals as a human amount
/// rounded to two places (`1234567` with 6 decimals is `"1.23"`).
///
/// Amounts too large for a `Decimal` are printed raw.
pub fn format_units(amount: u128, decimals: u32) -> String {
    to_decimal(amount, decimals)
        .map(|value| {
            value
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
                .to_string()
        })
        .unwrap_or_else(|| amount.to_string())
}

/// Exact decimal value of a raw amount, if representable.
pub fn to_decimal(amount: u128, decimals: u32) -> Option<Decimal> {
    let mantissa = i128::try_from(amount).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, decimals).ok()
}

/// Basis points as a percentage string (`25` is `"0.25%"`).
pub fn format_bps(bps: i128) -> String {
    match i64::try_from(bps) {
        Ok(bps) => format!("{}%", Decimal::new(bps, 2)),
        Err(_) => format!("{bps} bps"),
    }
}
