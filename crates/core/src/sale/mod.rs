//! Whitelist-gated, time-boxed distribution on top of the ledger.
//!
//! This module implements the sale engine:
//! - Admission whitelist (single and batch updates)
//! - Sale window, suspension and finalization
//! - Rate and bonus conversion with a fixed conversion factor
//! - Per-account cap with partial fills
//! - Reclaiming unsold units
//! - Planning and applying whitelist imports

pub mod engine;
pub mod error;
pub mod import;
pub mod pricing;
pub mod types;

#[cfg(test)]
mod engine_props;

pub use engine::SaleEngine;
pub use error::SaleError;
pub use import::{ImportError, ImportPlan, ImportReport, WhitelistEntry, WhitelistImport};
pub use pricing::{Pricing, conversion_factor};
pub use types::{PurchaseReceipt, SaleConfig, SaleEvent, SaleSnapshot, SaleState};
