//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::Decimal;

/// Fractional change from `from` to `to`, e.g. 100 -> 110 is 0.10.
///
/// Returns zero when `from` is zero so callers never divide by a dead quote.
pub fn fractional_change(from: Decimal, to: Decimal) -> Decimal {
    if from == Decimal::ZERO {
        return Decimal::ZERO;
    }
    (to - from) / from
}

/// Fractional drawdown from `high` down to `current`, clamped at zero when the
/// price sits at or above the high.
pub fn drawdown(high: Decimal, current: Decimal) -> Decimal {
    if high == Decimal::ZERO || current >= high {
        return Decimal::ZERO;
    }
    (high - current) / high
}

/// Safe division that returns zero if the divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}
