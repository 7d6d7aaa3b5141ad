//! Application-wide error types.

use thiserror::Error;

/// Result type alias using `AppError`.
pub type AppResult<T> = Result<T, AppError>;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Reading or writing an external file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed user input (scenario files, whitelist files, arguments).
    #[error("Invalid input: {0}")]
    Input(String),

    /// An operation was rejected by the ledger or the sale engine.
    #[error("Rejected ({code}): {message}")]
    Rejected {
        /// Stable error code of the rejection.
        code: &'static str,
        /// Human readable description.
        message: String,
    },

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the process exit status for this error.
    #[must_use]
    pub const fn status_code(&self) -> u8 {
        match self {
            Self::Input(_) => 2,
            Self::Rejected { .. } => 3,
            Self::Config(_) => 4,
            Self::Io(_) => 5,
            Self::Internal(_) => 70,
        }
    }

    /// Returns the error code for reports.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Input(_) => "INVALID_INPUT",
            Self::Rejected { code, .. } => code,
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Input(err.to_string())
    }
}
