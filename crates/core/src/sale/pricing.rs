//! Contribution to unit conversion.
//!
//! CRITICAL: integer arithmetic only. Products are formed in 512 bits so
//! `contribution × rate × (10_000 + bonus)` never overflows; the division
//! by the conversion factor happens once, at the end.

use primitive_types::U512;

use tally_shared::Amount;
use tally_shared::types::amount::pow10;

use super::error::SaleError;

/// Basis points in one whole (100%).
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Largest accepted bonus (+100%).
pub const MAX_BONUS_BPS: u32 = 10_000;

/// Decimals of the contribution currency.
pub const CONTRIBUTION_DECIMALS: u32 = 18;

/// Rate is quoted per thousand contribution units.
const RATE_EXPONENT: u32 = 3;

/// Bonus is quoted in basis points.
const BPS_EXPONENT: u32 = 4;

/// Computes `10^(18 − ledger_decimals + 3 + 4)`.
///
/// # Errors
///
/// Returns `InvalidAmount` when the ledger has more decimals than the
/// contribution currency.
pub fn conversion_factor(ledger_decimals: u32) -> Result<Amount, SaleError> {
    let exponent = CONTRIBUTION_DECIMALS
        .checked_sub(ledger_decimals)
        .ok_or(SaleError::InvalidAmount)?
        + RATE_EXPONENT
        + BPS_EXPONENT;
    pow10(exponent).ok_or(SaleError::ArithmeticOverflow)
}

/// Rate and bonus applied against a fixed conversion factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    tokens_per_kether: u64,
    bonus_bps: u32,
    factor: Amount,
}

impl Pricing {
    /// Creates a pricing from a rate, a bonus and a conversion factor.
    #[must_use]
    pub const fn new(tokens_per_kether: u64, bonus_bps: u32, factor: Amount) -> Self {
        Self {
            tokens_per_kether,
            bonus_bps,
            factor,
        }
    }

    fn multiplier(&self) -> U512 {
        U512::from(self.tokens_per_kether)
            * U512::from(u64::from(BPS_DENOMINATOR) + u64::from(self.bonus_bps))
    }

    /// Units granted for `contribution`, truncating.
    pub fn units_for(&self, contribution: Amount) -> Result<Amount, SaleError> {
        if self.factor.is_zero() {
            return Err(SaleError::ArithmeticOverflow);
        }
        let raw = U512::from(contribution) * self.multiplier() / U512::from(self.factor);
        Amount::try_from(raw).map_err(|_| SaleError::ArithmeticOverflow)
    }

    /// Contribution owed for exactly `units`, truncating.
    pub fn cost_of(&self, units: Amount) -> Result<Amount, SaleError> {
        let multiplier = self.multiplier();
        if multiplier.is_zero() {
            return Err(SaleError::InvalidAmount);
        }
        let cost = units.full_mul(self.factor) / multiplier;
        Amount::try_from(cost).map_err(|_| SaleError::ArithmeticOverflow)
    }
}
