//! Processing fee computation
//!
//! One rounding rule everywhere: half-up to the currency minor unit.
//! CLP is zero-decimal, so CLP fees are whole pesos.

use ledger_core::Currency;
use rust_decimal::{Decimal, RoundingStrategy};

/// Fee and net split of a gross payout amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    /// Fee withheld
    pub fee: Decimal,

    /// Amount transferred to the destination: gross - fee
    pub net_amount: Decimal,
}

/// Fee for a gross amount, rounded half-up to the minor unit
pub fn processing_fee(amount: Decimal, rate: Decimal, currency: Currency) -> Decimal {
    (amount * rate).round_dp_with_strategy(
        currency.minor_units(),
        RoundingStrategy::MidpointAwayFromZero,
    )
}

/// Split a gross amount into fee and net
pub fn split(amount: Decimal, rate: Decimal, currency: Currency) -> FeeBreakdown {
    let fee = processing_fee(amount, rate, currency);
    FeeBreakdown {
        fee,
        net_amount: amount - fee,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clp(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[test]
    fn test_reference_case() {
        // amount = 10000, rate = 0.02 -> fee = 200, net = 9800
        let breakdown = split(clp(10_000), Decimal::new(2, 2), Currency::CLP);
        assert_eq!(breakdown.fee, clp(200));
        assert_eq!(breakdown.net_amount, clp(9_800));
    }

    #[test]
    fn test_clp_rounds_half_up_to_whole_pesos() {
        // 5025 * 0.02 = 100.5 -> 101
        let fee = processing_fee(clp(5_025), Decimal::new(2, 2), Currency::CLP);
        assert_eq!(fee, clp(101));

        // 5024 * 0.02 = 100.48 -> 100
        let fee = processing_fee(clp(5_024), Decimal::new(2, 2), Currency::CLP);
        assert_eq!(fee, clp(100));
    }

    #[test]
    fn test_usd_rounds_to_cents() {
        // $100.99 * 2% = $2.0198 -> $2.02
        let fee = processing_fee(Decimal::new(10_099, 2), Decimal::new(2, 2), Currency::USD);
        assert_eq!(fee, Decimal::new(202, 2));

        // Midpoint: $51.25 * 2% = $1.025 -> $1.03
        let fee = processing_fee(Decimal::new(5_125, 2), Decimal::new(2, 2), Currency::USD);
        assert_eq!(fee, Decimal::new(103, 2));
    }

    #[test]
    fn test_zero_rate_means_zero_fee() {
        let breakdown = split(clp(10_000), Decimal::ZERO, Currency::CLP);
        assert_eq!(breakdown.fee, Decimal::ZERO);
        assert_eq!(breakdown.net_amount, clp(10_000));
    }

    #[test]
    fn test_net_plus_fee_equals_gross() {
        for amount in [5_000i64, 5_001, 9_999, 123_457, 1_000_000] {
            let breakdown = split(clp(amount), Decimal::new(2, 2), Currency::CLP);
            assert_eq!(breakdown.fee + breakdown.net_amount, clp(amount));
        }
    }

    proptest::proptest! {
        /// The split never loses or invents money, and the fee is never
        /// negative or larger than the gross amount
        #[test]
        fn prop_split_conserves_gross(amount in 1i64..100_000_000i64) {
            let gross = clp(amount);
            let breakdown = split(gross, Decimal::new(2, 2), Currency::CLP);

            proptest::prop_assert_eq!(breakdown.fee + breakdown.net_amount, gross);
            proptest::prop_assert!(breakdown.fee >= Decimal::ZERO);
            proptest::prop_assert!(breakdown.fee <= gross);
            // Whole pesos only for CLP
            proptest::prop_assert_eq!(breakdown.fee, breakdown.fee.round_dp(0));
        }
    }
}
