//! Ledger error types.
//!
//! Every ledger failure is a synchronous rejection: the ledger state is
//! untouched when one of these is returned.

use thiserror::Error;

use tally_shared::{AccountId, Amount};

use crate::error::ErrorKind;
use crate::roles::RoleError;

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // ========== Authorization Errors ==========
    /// Caller lacks the required role.
    #[error("Account {0} is not authorized for this operation")]
    Unauthorized(AccountId),

    // ========== Input Errors ==========
    /// Amount must be positive.
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    /// Account cannot be used as a target.
    #[error("Invalid target account: {0}")]
    InvalidTarget(AccountId),

    // ========== Accounting Errors ==========
    /// Account balance is too low.
    #[error("Insufficient balance for {account}: has {balance}, needs {required}")]
    InsufficientBalance {
        /// Debited account.
        account: AccountId,
        /// Balance at the time of the request.
        balance: Amount,
        /// Requested amount.
        required: Amount,
    },

    /// Approved allowance is too low.
    #[error("Insufficient allowance from {owner} to {spender}: has {allowance}, needs {required}")]
    InsufficientAllowance {
        /// Account whose units would be spent.
        owner: AccountId,
        /// Account spending them.
        spender: AccountId,
        /// Allowance at the time of the request.
        allowance: Amount,
        /// Requested amount.
        required: Amount,
    },

    // ========== Lifecycle Errors ==========
    /// Transfers are permanently halted.
    #[error("Transfers are halted")]
    TransfersHalted,

    /// Ledger is already frozen.
    #[error("Ledger is already frozen")]
    AlreadyFrozen,

    /// Ledger is already finalized.
    #[error("Ledger is already finalized")]
    AlreadyFinalized,

    // ========== Internal Errors ==========
    /// Arithmetic overflow.
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,
}

impl LedgerError {
    /// Returns the error code for reports.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::InvalidTarget(_) => "INVALID_TARGET",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::InsufficientAllowance { .. } => "INSUFFICIENT_ALLOWANCE",
            Self::TransfersHalted => "TRANSFERS_HALTED",
            Self::AlreadyFrozen => "ALREADY_FROZEN",
            Self::AlreadyFinalized => "ALREADY_FINALIZED",
            Self::ArithmeticOverflow => "ARITHMETIC_OVERFLOW",
        }
    }

    /// Returns the error classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Authorization,
            Self::InvalidAmount | Self::InvalidTarget(_) => ErrorKind::Input,
            Self::InsufficientBalance { .. } | Self::InsufficientAllowance { .. } => {
                ErrorKind::Accounting
            }
            Self::TransfersHalted | Self::AlreadyFrozen | Self::AlreadyFinalized => {
                ErrorKind::Lifecycle
            }
            Self::ArithmeticOverflow => ErrorKind::Internal,
        }
    }
}

impl From<RoleError> for LedgerError {
    fn from(err: RoleError) -> Self {
        match err {
            RoleError::NotOwner(caller)
            | RoleError::NotOwnerOrOperations(caller)
            | RoleError::NotProposedOwner(caller) => Self::Unauthorized(caller),
            RoleError::InvalidTarget(target) => Self::InvalidTarget(target),
        }
    }
}
