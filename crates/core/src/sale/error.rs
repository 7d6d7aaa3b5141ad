//! Sale engine error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use tally_shared::{AccountId, Amount};

use super::types::SaleState;
use crate::error::ErrorKind;
use crate::ledger::LedgerError;
use crate::roles::RoleError;

/// Errors that can occur during sale operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaleError {
    // ========== Authorization Errors ==========
    /// Caller lacks the required role.
    #[error("Account {0} is not authorized for this operation")]
    Unauthorized(AccountId),

    /// Payer or beneficiary is not admitted.
    #[error("Account {0} is not whitelisted")]
    NotWhitelisted(AccountId),

    // ========== Input Errors ==========
    /// Amount is zero or out of range.
    #[error("Invalid amount")]
    InvalidAmount,

    /// Account cannot be used here.
    #[error("Invalid target account: {0}")]
    InvalidTarget(AccountId),

    /// Window start is not before its end.
    #[error("Invalid sale window: {start} is not before {end}")]
    InvalidWindow {
        /// Requested opening time.
        start: DateTime<Utc>,
        /// Requested closing time.
        end: DateTime<Utc>,
    },

    /// Contribution is under the minimum.
    #[error("Contribution {contribution} is below the minimum of {minimum}")]
    BelowMinimum {
        /// Submitted contribution.
        contribution: Amount,
        /// Configured minimum.
        minimum: Amount,
    },

    /// Batch update with no accounts.
    #[error("Batch is empty")]
    EmptyBatch,

    /// Operation targets a ledger other than the bound one.
    #[error("Ledger mismatch: bound to {expected}, got {actual}")]
    LedgerMismatch {
        /// Bound ledger.
        expected: AccountId,
        /// Ledger passed in.
        actual: AccountId,
    },

    // ========== Accounting Errors ==========
    /// Beneficiary already holds the per-account maximum.
    #[error("Cap reached for {beneficiary}: holds {balance} of {cap}")]
    CapReached {
        /// Beneficiary.
        beneficiary: AccountId,
        /// Current ledger balance of the beneficiary.
        balance: Amount,
        /// Configured cap.
        cap: Amount,
    },

    // ========== Lifecycle Errors ==========
    /// Sale is not accepting purchases.
    #[error("Sale is not open (state: {0})")]
    SaleNotOpen(SaleState),

    /// Sale has been finalized.
    #[error("Sale is finalized")]
    SaleFinalized,

    /// Finalize called twice.
    #[error("Sale is already finalized")]
    AlreadyFinalized,

    /// Initialize called twice.
    #[error("Sale is already initialized")]
    AlreadyInitialized,

    /// Operation needs a bound ledger.
    #[error("Sale is not initialized")]
    NotInitialized,

    /// Suspend while suspended, or resume while running.
    #[error("Cannot {action} in the current state")]
    InvalidTransition {
        /// Attempted action.
        action: &'static str,
    },

    // ========== Internal Errors ==========
    /// Arithmetic overflow.
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    /// Ledger rejected the movement.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl SaleError {
    /// Returns the error code for reports. Ledger failures keep their own code.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::NotWhitelisted(_) => "NOT_WHITELISTED",
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::InvalidTarget(_) => "INVALID_TARGET",
            Self::InvalidWindow { .. } => "INVALID_WINDOW",
            Self::BelowMinimum { .. } => "BELOW_MINIMUM",
            Self::EmptyBatch => "EMPTY_BATCH",
            Self::LedgerMismatch { .. } => "LEDGER_MISMATCH",
            Self::CapReached { .. } => "CAP_REACHED",
            Self::SaleNotOpen(_) => "SALE_NOT_OPEN",
            Self::SaleFinalized => "SALE_FINALIZED",
            Self::AlreadyFinalized => "ALREADY_FINALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::ArithmeticOverflow => "ARITHMETIC_OVERFLOW",
            Self::Ledger(inner) => inner.error_code(),
        }
    }

    /// Returns the error classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) | Self::NotWhitelisted(_) => ErrorKind::Authorization,
            Self::InvalidAmount
            | Self::InvalidTarget(_)
            | Self::InvalidWindow { .. }
            | Self::BelowMinimum { .. }
            | Self::EmptyBatch
            | Self::LedgerMismatch { .. } => ErrorKind::Input,
            Self::CapReached { .. } => ErrorKind::Accounting,
            Self::SaleNotOpen(_)
            | Self::SaleFinalized
            | Self::AlreadyFinalized
            | Self::AlreadyInitialized
            | Self::NotInitialized
            | Self::InvalidTransition { .. } => ErrorKind::Lifecycle,
            Self::ArithmeticOverflow => ErrorKind::Internal,
            Self::Ledger(inner) => inner.kind(),
        }
    }
}

impl From<RoleError> for SaleError {
    fn from(err: RoleError) -> Self {
        match err {
            RoleError::NotOwner(caller)
            | RoleError::NotOwnerOrOperations(caller)
            | RoleError::NotProposedOwner(caller) => Self::Unauthorized(caller),
            RoleError::InvalidTarget(target) => Self::InvalidTarget(target),
        }
    }
}
