//! Money conversion helpers.
//!
//! Store documents carry amounts in major currency units (dollars); the
//! payment gateway wants minor units (cents). Conversions live here so the
//! rounding rule exists exactly once.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Convert a major-unit amount to gateway minor units (`amount * 100`).
///
/// Fractional sub-cent amounts are truncated, matching the gateway's own
/// integer arithmetic. Returns `None` when the result does not fit an i64
/// (an amount that large is a corrupt document, not a sale).
#[must_use]
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED).trunc().to_i64()
}

/// Convert gateway minor units back to a major-unit amount.
#[must_use]
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}
