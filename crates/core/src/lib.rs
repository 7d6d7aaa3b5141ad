//! Core business logic for Tally.
//!
//! This crate contains pure business logic with ZERO file or network
//! dependencies. All domain types, validation rules, and calculations live
//! here.
//!
//! # Modules
//!
//! - `ledger` - Balances, allowances, supply and the freeze/finalize gate
//! - `sale` - Whitelist-gated, time-boxed distribution on top of the ledger
//! - `roles` - Owner / proposed owner / operations role table
//! - `deployment` - Both components behind one lock
//! - `clock`, `events`, `latch` - Time sources, event logs, one-way flags

pub mod clock;
pub mod deployment;
pub mod error;
pub mod events;
pub mod latch;
pub mod ledger;
pub mod roles;
pub mod sale;

pub use clock::{Clock, ManualClock, SystemClock};
pub use deployment::{Deployment, DeploymentPlan, DeploymentSnapshot};
pub use error::ErrorKind;
pub use events::EventLog;
pub use ledger::{Ledger, LedgerError, LedgerEvent};
pub use sale::{PurchaseReceipt, SaleEngine, SaleError, SaleEvent, SaleState};
