//! Error classification shared by every component.
//!
//! Each component owns its own `thiserror` enum; this module groups their
//! variants into coarse kinds and lifts them into the application error.

use serde::Serialize;
use std::fmt;

use tally_shared::AppError;

use crate::ledger::LedgerError;
use crate::roles::RoleError;
use crate::sale::{ImportError, SaleError};

/// Coarse classification of a rejected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The caller lacks the required role.
    Authorization,
    /// The request itself is malformed.
    Input,
    /// A value-accounting limit was hit.
    Accounting,
    /// The component is in the wrong lifecycle state.
    Lifecycle,
    /// Internal arithmetic or consistency failure.
    Internal,
}

impl ErrorKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorization => "authorization",
            Self::Input => "input",
            Self::Accounting => "accounting",
            Self::Lifecycle => "lifecycle",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<RoleError> for AppError {
    fn from(err: RoleError) -> Self {
        Self::Rejected {
            code: err.error_code(),
            message: err.to_string(),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        Self::Rejected {
            code: err.error_code(),
            message: err.to_string(),
        }
    }
}

impl From<SaleError> for AppError {
    fn from(err: SaleError) -> Self {
        Self::Rejected {
            code: err.error_code(),
            message: err.to_string(),
        }
    }
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Sale(inner) => inner.into(),
            other => Self::Input(other.to_string()),
        }
    }
}
