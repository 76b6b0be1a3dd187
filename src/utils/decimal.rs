//! Decimal arithmetic for price thresholds.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Move `value` up by `percent` percent: `value * (100 + percent) / 100`.
///
/// Returns `None` on overflow.
pub fn increase_by_percent(value: Decimal, percent: Decimal) -> Option<Decimal> {
    dec!(100)
        .checked_add(percent)
        .and_then(|factor| value.checked_mul(factor))
        .and_then(|scaled| scaled.checked_div(dec!(100)))
}

/// Move `value` down by `percent` percent: `value * (100 - percent) / 100`.
///
/// A change of 100% or more yields zero or a negative threshold; callers decide
/// whether that is meaningful.
pub fn decrease_by_percent(value: Decimal, percent: Decimal) -> Option<Decimal> {
    dec!(100)
        .checked_sub(percent)
        .and_then(|factor| value.checked_mul(factor))
        .and_then(|scaled| scaled.checked_div(dec!(100)))
}

/// Calculate percentage difference between two values.
///
/// Returns `None` when `b` is zero or the result does not fit a `Decimal`.
pub fn percentage_diff(a: Decimal, b: Decimal) -> Option<Decimal> {
    a.checked_sub(b)
        .and_then(|diff| diff.checked_div(b))
        .and_then(|ratio| ratio.abs().checked_mul(dec!(100)))
}
