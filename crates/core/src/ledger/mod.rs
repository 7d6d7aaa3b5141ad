//! Fungible unit ledger.
//!
//! This module implements the ledger component:
//! - Balances and total supply (supply only ever shrinks, via burn)
//! - Allowances for delegated transfers
//! - The freeze / finalize transfer gate
//! - Reclaiming units sent to the ledger's own address

pub mod error;
pub mod service;
pub mod types;

#[cfg(test)]
mod service_props;

pub use error::LedgerError;
pub use service::Ledger;
pub use types::{Holding, LedgerConfig, LedgerEvent, LedgerSnapshot};
