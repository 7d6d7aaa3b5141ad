//! Common types used across the application.

pub mod amount;
pub mod id;

pub use amount::{Amount, AmountError};
pub use id::AccountId;
