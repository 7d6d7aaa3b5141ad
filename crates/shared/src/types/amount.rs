//! Unit amounts with arbitrary-width integer precision.
//!
//! CRITICAL: Never use floating-point for unit accounting.
//! Amounts are 256-bit unsigned integers counted in the smallest
//! indivisible unit; they travel through config and JSON as decimal strings.

use primitive_types::U256;
use thiserror::Error;

/// An amount of ledger units (or of external contribution) in base units.
pub type Amount = U256;

/// Errors produced while parsing amounts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// The input was empty.
    #[error("Amount is empty")]
    Empty,

    /// The input is not a base-10 unsigned integer that fits 256 bits.
    #[error("Invalid amount: {0}")]
    Invalid(String),

    /// Scaling by the requested number of decimals overflowed.
    #[error("Amount overflows when scaled by 10^{0}")]
    Overflow(u32),
}

/// Returns `10^exponent` as an [`Amount`], or `None` when it does not fit.
#[must_use]
pub fn pow10(exponent: u32) -> Option<Amount> {
    let ten = U256::from(10u8);
    (0..exponent).try_fold(U256::one(), |acc, _| acc.checked_mul(ten))
}

/// Converts a whole number of units into base units for the given precision.
///
/// # Example
///
/// ```
/// use tally_shared::types::amount::{scale_units, Amount};
///
/// assert_eq!(scale_units(3, 2).unwrap(), Amount::from(300u64));
/// ```
pub fn scale_units(whole: u64, decimals: u32) -> Result<Amount, AmountError> {
    pow10(decimals)
        .and_then(|factor| U256::from(whole).checked_mul(factor))
        .ok_or(AmountError::Overflow(decimals))
}

/// Parses a base-10 amount, ignoring surrounding whitespace and `_` separators.
pub fn parse_amount(input: &str) -> Result<Amount, AmountError> {
    let cleaned: String = input.trim().chars().filter(|c| *c != '_').collect();
    if cleaned.is_empty() {
        return Err(AmountError::Empty);
    }
    if !cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountError::Invalid(input.to_string()));
    }
    U256::from_dec_str(&cleaned).map_err(|_| AmountError::Invalid(input.to_string()))
}

/// Formats base units as a decimal number of whole units, trimming trailing zeros.
#[must_use]
pub fn format_units(amount: Amount, decimals: u32) -> String {
    let Some(factor) = pow10(decimals) else {
        return amount.to_string();
    };
    if decimals == 0 {
        return amount.to_string();
    }
    let whole = amount / factor;
    let fraction = amount % factor;
    if fraction.is_zero() {
        return whole.to_string();
    }
    let width = decimals as usize;
    let padded = format!("{:0>width$}", fraction.to_string());
    format!("{whole}.{}", padded.trim_end_matches('0'))
}

/// Serde adapter: amounts as decimal strings (integers accepted on input).
pub mod dec_str {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    use super::{Amount, parse_amount};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(u64),
    }

    /// Serializes an amount as a decimal string.
    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(amount)
    }

    /// Deserializes an amount from a decimal string or an unsigned integer.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => parse_amount(&text).map_err(D::Error::custom),
            Repr::Number(n) => Ok(Amount::from(n)),
        }
    }
}
