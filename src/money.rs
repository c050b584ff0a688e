//! Exact decimal money helpers.
//!
//! The source system requires two-fractional-digit decimals with exact
//! comparisons and additions end-to-end — never binary floating point.
//! `rust_decimal::Decimal` already gives us that; this module only adds the
//! normalization and validation the admission boundary needs.

use rust_decimal::Decimal;

/// Normalize an amount to exactly two fractional digits, banker's-rounding
/// any excess precision a client sent us.
pub fn normalize(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

/// An amount is acceptable as bid money if it is positive, finite, and has
/// no more than two fractional digits once normalized equals itself.
pub fn is_valid_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO && normalize(amount) == amount
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_non_positive() {
        assert!(!is_valid_amount(dec!(0)));
        assert!(!is_valid_amount(dec!(-5.00)));
    }

    #[test]
    fn rejects_sub_cent_precision() {
        assert!(!is_valid_amount(dec!(10.001)));
    }

    #[test]
    fn accepts_two_decimal_amounts() {
        assert!(is_valid_amount(dec!(100.00)));
        assert!(is_valid_amount(dec!(99.99)));
    }
}
