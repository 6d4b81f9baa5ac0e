//! Decimal arithmetic utilities for spread and slippage calculations.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Round down to lot size (quantity precision).
pub fn round_down_to_lot(value: Decimal, lot_size: Decimal) -> Decimal {
    if lot_size == Decimal::ZERO {
        return value;
    }
    (value / lot_size).floor() * lot_size
}

/// Calculate basis points (1 bp = 0.01%), `None` on overflow.
pub fn to_basis_points(rate: Decimal) -> Option<Decimal> {
    rate.checked_mul(dec!(10000))
}

/// Convert basis points to decimal rate
pub fn from_basis_points(bps: Decimal) -> Decimal {
    bps / dec!(10000)
}

/// Price sitting `spread_bps` above (or below, if negative) a reference.
pub fn price_at_spread(reference: Decimal, spread_bps: Decimal) -> Decimal {
    reference * (Decimal::ONE + from_basis_points(spread_bps))
}

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Lossy conversion for statistics.
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Conversion back from statistics; non-finite input maps to zero.
pub fn from_f64(value: f64) -> Decimal {
    if !value.is_finite() {
        return Decimal::ZERO;
    }
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_down_to_lot() {
        assert_eq!(round_down_to_lot(dec!(1.567), dec!(0.001)), dec!(1.567));
        assert_eq!(round_down_to_lot(dec!(1.567), dec!(0.01)), dec!(1.56));
        assert_eq!(round_down_to_lot(dec!(0.00123), dec!(0.001)), dec!(0.001));
        assert_eq!(round_down_to_lot(dec!(0.5), Decimal::ZERO), dec!(0.5));
    }

    #[test]
    fn test_basis_points() {
        assert_eq!(to_basis_points(dec!(0.0001)), Some(dec!(1))); // 0.01% = 1 bp
        assert_eq!(to_basis_points(dec!(0.01)), Some(dec!(100))); // 1% = 100 bp
        assert_eq!(to_basis_points(Decimal::MAX), None);
        assert_eq!(from_basis_points(dec!(50)), dec!(0.005)); // 50 bp = 0.5%
    }

    #[test]
    fn test_price_at_spread() {
        assert_eq!(price_at_spread(dec!(100000), dec!(6.5)), dec!(100065));
        assert_eq!(price_at_spread(dec!(100000), dec!(-1.5)), dec!(99985));
    }

    #[test]
    fn test_safe_div_and_float_bridge() {
        assert_eq!(safe_div(dec!(10), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(safe_div(dec!(10), dec!(4)), dec!(2.5));
        assert_eq!(to_f64(dec!(0.25)), 0.25);
        assert_eq!(from_f64(f64::NAN), Decimal::ZERO);
    }
}
