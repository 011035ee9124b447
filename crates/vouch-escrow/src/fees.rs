//! Fee calculation for escrow transactions.
//!
//! Fees are computed exactly once at transaction creation and stored on
//! the record; later transitions never re-derive them, so a rate change
//! cannot drift fees mid-lifecycle.
//!
//! All math is integer-only with `u128` intermediates. Percentage fees
//! round up (ceiling division), matching how settlement math is done
//! elsewhere in the workspace.

use serde::{Deserialize, Serialize};

use crate::error::{EscrowError, Result};
use vouch_core::Amount;

/// Escrow service fee rate in basis points (2.5%).
pub const ESCROW_FEE_BPS: u64 = 250;

/// Platform fee rate in basis points (3%).
pub const PLATFORM_FEE_BPS: u64 = 300;

/// Minimum charged per fee component (100.00 in minor units).
pub const FEE_FLOOR: Amount = Amount::from_minor(10_000);

/// Maximum total fee per transaction (5000.00 in minor units).
pub const FEE_CEILING: Amount = Amount::from_minor(500_000);

/// Amounts above this threshold require shipping insurance (10 000.00).
pub const INSURANCE_THRESHOLD: Amount = Amount::from_minor(1_000_000);

const BPS_DENOMINATOR: u128 = 10_000;

/// The fee breakdown computed for a transaction at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    /// Fee for holding funds in escrow.
    pub escrow_fee: Amount,
    /// Marketplace platform fee, deducted from the seller payout.
    pub platform_fee: Amount,
    /// Total charged to the buyer on top of the amount.
    pub total_fee: Amount,
}

/// Compute the fee breakdown for a transaction amount.
///
/// `escrow_fee = max(FEE_FLOOR, amount × 2.5%)`,
/// `platform_fee = max(FEE_FLOOR, amount × 3%)`,
/// `total_fee = min(FEE_CEILING, escrow_fee + platform_fee)`.
///
/// # Errors
///
/// Returns [`EscrowError::InvalidInput`] if the amount is zero.
pub fn calculate(amount: Amount) -> Result<FeeBreakdown> {
    if amount.is_zero() {
        return Err(EscrowError::invalid_input(
            "fee calculation requires a positive amount",
        ));
    }

    let escrow_fee = rate_fee(amount, ESCROW_FEE_BPS).max(FEE_FLOOR);
    let platform_fee = rate_fee(amount, PLATFORM_FEE_BPS).max(FEE_FLOOR);
    let total_fee = escrow_fee.saturating_add(platform_fee).min(FEE_CEILING);

    Ok(FeeBreakdown {
        escrow_fee,
        platform_fee,
        total_fee,
    })
}

/// Ceiling of `amount × bps / 10_000` with u128 intermediates.
const fn rate_fee(amount: Amount, bps: u64) -> Amount {
    let numerator = amount.minor() as u128 * bps as u128;
    let fee = (numerator + BPS_DENOMINATOR - 1) / BPS_DENOMINATOR;
    if fee > u64::MAX as u128 {
        Amount::MAX
    } else {
        Amount::from_minor(fee as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn small_amount_hits_floor() {
        // 1000.00: raw fees 25.00 and 30.00 are both below the 100.00 floor.
        let fees = calculate(Amount::from_major(1000)).unwrap();
        assert_eq!(fees.escrow_fee, FEE_FLOOR);
        assert_eq!(fees.platform_fee, FEE_FLOOR);
        assert_eq!(fees.total_fee, Amount::from_major(200));
    }

    #[test]
    fn mid_amount_is_proportional() {
        // 10 000.00: escrow 250.00, platform 300.00, total 550.00.
        let fees = calculate(Amount::from_major(10_000)).unwrap();
        assert_eq!(fees.escrow_fee, Amount::from_major(250));
        assert_eq!(fees.platform_fee, Amount::from_major(300));
        assert_eq!(fees.total_fee, Amount::from_major(550));
    }

    #[test]
    fn large_amount_hits_ceiling() {
        // 1 000 000.00: sum of component fees far exceeds the 5000.00 cap.
        let fees = calculate(Amount::from_major(1_000_000)).unwrap();
        assert_eq!(fees.escrow_fee, Amount::from_major(25_000));
        assert_eq!(fees.platform_fee, Amount::from_major(30_000));
        assert_eq!(fees.total_fee, FEE_CEILING);
    }

    #[test]
    fn zero_amount_rejected() {
        let result = calculate(Amount::ZERO);
        assert!(result.is_err());
    }

    #[test]
    fn fractional_fee_rounds_up() {
        // 1.01 at 2.5% = 2.525 minor units, rounds up to 3 (then floored).
        let raw = super::rate_fee(Amount::from_minor(101), ESCROW_FEE_BPS);
        assert_eq!(raw, Amount::from_minor(3));
    }

    #[test]
    fn calculation_is_deterministic() {
        let a = calculate(Amount::from_major(7777)).unwrap();
        let b = calculate(Amount::from_major(7777)).unwrap();
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn fees_respect_floor_and_ceiling(minor in 1u64..=1_000_000_000_000) {
            let fees = calculate(Amount::from_minor(minor)).unwrap();
            prop_assert!(fees.escrow_fee >= FEE_FLOOR);
            prop_assert!(fees.platform_fee >= FEE_FLOOR);
            prop_assert!(fees.total_fee <= FEE_CEILING);
            prop_assert!(
                fees.total_fee
                    <= fees.escrow_fee.saturating_add(fees.platform_fee)
            );
        }

        #[test]
        fn fees_monotone_in_amount(minor in 1u64..=1_000_000_000) {
            let lo = calculate(Amount::from_minor(minor)).unwrap();
            let hi = calculate(Amount::from_minor(minor + 1)).unwrap();
            prop_assert!(hi.escrow_fee >= lo.escrow_fee);
            prop_assert!(hi.platform_fee >= lo.platform_fee);
            prop_assert!(hi.total_fee >= lo.total_fee);
        }
    }
}
