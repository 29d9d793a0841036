//! Money arithmetic on `rust_decimal::Decimal`
//!
//! All monetary amounts are two-decimal values. Rounding is always
//! half-away-from-zero so a split of a total never drifts by more than a cent.

use rust_decimal::prelude::*;

/// Number of decimal places kept for monetary values
pub const DECIMAL_PLACES: u32 = 2;

/// Tolerance for monetary comparisons (0.01)
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Smallest amount a seller may withdraw (5.00)
pub const MIN_WITHDRAWAL: Decimal = Decimal::from_parts(500, 0, 0, false, 2);

/// Round to two decimal places, half away from zero
#[inline]
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Platform/seller split of an order total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub platform_fee: Decimal,
    pub seller_amount: Decimal,
}

/// Split `total` into the platform fee (`fee_percentage` of total) and the
/// seller share. The seller amount is derived by subtraction, so
/// `platform_fee + seller_amount == total` for any two-decimal total.
pub fn split(total: Decimal, fee_percentage: Decimal) -> Split {
    let platform_fee = round2(total * fee_percentage / Decimal::ONE_HUNDRED);
    let seller_amount = round2(total - platform_fee);
    Split {
        platform_fee,
        seller_amount,
    }
}

/// Compare two amounts within [`MONEY_TOLERANCE`]
#[inline]
pub fn approx_eq(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= MONEY_TOLERANCE
}

/// Line total for `quantity` units at `unit_price`
#[inline]
pub fn line_total(unit_price: Decimal, quantity: u32) -> Decimal {
    round2(unit_price * Decimal::from(quantity))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_round2_half_away_from_zero() {
        assert_eq!(round2(dec("1.005")), dec("1.01"));
        assert_eq!(round2(dec("1.004")), dec("1.00"));
        assert_eq!(round2(dec("-1.005")), dec("-1.01"));
    }

    #[test]
    fn test_split_five_percent() {
        let s = split(dec("100.00"), dec("5.0"));
        assert_eq!(s.platform_fee, dec("5.00"));
        assert_eq!(s.seller_amount, dec("95.00"));
    }

    #[test]
    fn test_split_sums_to_total() {
        for total in ["0.01", "0.99", "10.33", "57.89", "1234.57", "99999.99"] {
            let total = Decimal::from_str(total).unwrap();
            let s = split(total, dec("5.0"));
            assert_eq!(s.platform_fee + s.seller_amount, total);
        }
    }

    #[test]
    fn test_split_rounds_fee() {
        // 5% of 10.33 = 0.5165
        let s = split(dec("10.33"), dec("5.0"));
        assert_eq!(s.platform_fee, dec("0.52"));
        assert_eq!(s.seller_amount, dec("9.81"));
    }

    #[test]
    fn test_line_total() {
        assert_eq!(line_total(dec("19.90"), 3), dec("59.70"));
    }

    #[test]
    fn test_min_withdrawal_constant() {
        assert_eq!(MIN_WITHDRAWAL, dec("5.00"));
        assert!(approx_eq(MONEY_TOLERANCE, dec("0.01")));
    }
}
