//! Exact money arithmetic
//!
//! All monetary quantities are `rust_decimal::Decimal`. Addition and
//! subtraction are exact; the only division in the engine is the VAT
//! split, which rounds half-away-from-zero at the cent. Balance
//! comparisons tolerate one cent of accumulated rounding.

use rust_decimal::{Decimal, RoundingStrategy};

/// Comparison tolerance for balance invariants: one cent
pub fn tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// Round to cents, half-away-from-zero
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Split a gross amount into `(net, vat)` for a VAT rate fraction
///
/// `vat = gross · r / (1 + r)` rounded at the cent; `net = gross − vat`,
/// so the parts always recompose to the gross exactly.
pub fn split_gross(gross: Decimal, rate: Decimal) -> (Decimal, Decimal) {
    if rate.is_zero() {
        return (gross, Decimal::ZERO);
    }
    let vat = round_cents(gross * rate / (Decimal::ONE + rate));
    (gross - vat, vat)
}

/// Equality within the one-cent tolerance
pub fn money_eq(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= tolerance()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_split_standard_rate() {
        // 1200 gross at 20% → 1000 net + 200 VAT
        let (net, vat) = split_gross(dec!(1200.00), dec!(0.20));
        assert_eq!(net, dec!(1000.00));
        assert_eq!(vat, dec!(200.00));
    }

    #[test]
    fn test_split_reduced_rate() {
        let (net, vat) = split_gross(dec!(105.50), dec!(0.055));
        assert_eq!(net + vat, dec!(105.50));
        assert_eq!(vat, dec!(5.50));
    }

    #[test]
    fn test_split_zero_rate() {
        let (net, vat) = split_gross(dec!(99.99), Decimal::ZERO);
        assert_eq!(net, dec!(99.99));
        assert_eq!(vat, Decimal::ZERO);
    }

    #[test]
    fn test_split_recomposes_exactly() {
        for cents in [1i64, 33, 100, 12345, 999_999] {
            let gross = Decimal::new(cents, 2);
            let (net, vat) = split_gross(gross, dec!(0.10));
            assert_eq!(net + vat, gross, "gross {} did not recompose", gross);
        }
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(round_cents(dec!(1.005)), dec!(1.01));
        assert_eq!(round_cents(dec!(-1.005)), dec!(-1.01));
        assert_eq!(round_cents(dec!(1.004)), dec!(1.00));
    }

    #[test]
    fn test_money_eq_tolerance() {
        assert!(money_eq(dec!(100.00), dec!(100.01)));
        assert!(money_eq(dec!(100.00), dec!(99.99)));
        assert!(!money_eq(dec!(100.00), dec!(100.02)));
    }
}
