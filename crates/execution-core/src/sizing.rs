//! Budget to quantity conversion.
//!
//! All rounding is truncation toward zero so a sized order never costs more
//! than its budget and never breaks the exchange's lot or tick grid.

use rust_decimal::Decimal;
use thiserror::Error;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizingError {
    /// The budget does not buy the minimum lot, or the inputs are unusable.
    #[error("insufficient budget: quantity {qty} below minimum {min_qty}")]
    Insufficient { qty: Decimal, min_qty: Decimal },
}

/// Truncate `value` to a multiple of `step`.
///
/// A non-positive step leaves the value untouched.
pub fn floor_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    ((value / step).trunc() * step).normalize()
}

/// Truncate a price to the instrument's tick.
pub fn round_price(price: Decimal, tick: Decimal) -> Decimal {
    floor_to_step(price, tick)
}

/// Largest step multiple of base coin that `budget` buys at `price`.
///
/// # Errors
/// [`SizingError::Insufficient`] when the result is below `min_qty` or when
/// `price` or `qty_step` is not positive.
pub fn size_order(
    budget: Decimal,
    price: Decimal,
    min_qty: Decimal,
    qty_step: Decimal,
) -> Result<Decimal, SizingError> {
    if price <= Decimal::ZERO || qty_step <= Decimal::ZERO || budget <= Decimal::ZERO {
        return Err(SizingError::Insufficient {
            qty: Decimal::ZERO,
            min_qty,
        });
    }

    let qty = floor_to_step(budget / price, qty_step);
    if qty < min_qty || qty.is_zero() {
        return Err(SizingError::Insufficient { qty, min_qty });
    }
    Ok(qty)
}

/// `price` moved by `pct` percent; negative `pct` moves it down.
pub fn shift_by_pct(price: Decimal, pct: Decimal) -> Decimal {
    price * (Decimal::ONE + pct / HUNDRED)
}
