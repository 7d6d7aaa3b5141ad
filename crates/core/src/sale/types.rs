//! Sale engine domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use tally_shared::config::SaleSettings;
use tally_shared::types::amount::dec_str;
use tally_shared::{AccountId, Amount};

use crate::roles::RoleEvent;

/// Adjustable sale parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleConfig {
    /// Opening of the window (inclusive).
    pub start_time: DateTime<Utc>,
    /// Closing of the window (inclusive).
    pub end_time: DateTime<Utc>,
    /// Whole units granted per 1,000 whole units of contribution.
    pub tokens_per_kether: u64,
    /// Bonus in basis points.
    pub bonus_bps: u32,
    /// Per-account cap in base units (zero = unlimited).
    #[serde(with = "dec_str")]
    pub max_units_per_account: Amount,
    /// Minimum accepted contribution.
    #[serde(with = "dec_str")]
    pub contribution_min: Amount,
}

impl SaleConfig {
    /// Builds the sale parameters from settings.
    #[must_use]
    pub fn from_settings(settings: &SaleSettings) -> Self {
        Self {
            start_time: settings.start_time,
            end_time: settings.end_time,
            tokens_per_kether: settings.tokens_per_kether,
            bonus_bps: settings.bonus_bps,
            max_units_per_account: settings.max_units_per_account,
            contribution_min: settings.contribution_min,
        }
    }
}

impl Default for SaleConfig {
    fn default() -> Self {
        Self::from_settings(&SaleSettings::default())
    }
}

/// Lifecycle state of the sale engine.
///
/// The valid progression is:
/// - Uninitialized → Configured (bound to a ledger)
/// - Configured → Open (window reached)
/// - Open ⇄ Suspended (administrator action)
/// - Open/Suspended → Closed (window passed)
/// - any → Finalized (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleState {
    /// Not yet bound to a ledger.
    Uninitialized,
    /// Bound, window not reached yet.
    Configured,
    /// Accepting purchases.
    Open,
    /// Temporarily halted by the owner.
    Suspended,
    /// Window has passed.
    Closed,
    /// Permanently ended.
    Finalized,
}

impl SaleState {
    /// Returns the string representation of the state.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Configured => "configured",
            Self::Open => "open",
            Self::Suspended => "suspended",
            Self::Closed => "closed",
            Self::Finalized => "finalized",
        }
    }
}

impl fmt::Display for SaleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of an accepted purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    /// Units credited to the beneficiary.
    #[serde(with = "dec_str")]
    pub units: Amount,
    /// Contribution actually consumed.
    #[serde(with = "dec_str")]
    pub cost: Amount,
    /// Contribution to hand back to the payer.
    #[serde(with = "dec_str")]
    pub refund: Amount,
}

/// Events emitted by the sale engine, one per state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SaleEvent {
    /// Bound to a ledger.
    Initialized {
        /// Ledger address.
        ledger: AccountId,
        /// Conversion factor derived from the ledger decimals.
        #[serde(with = "dec_str")]
        conversion_factor: Amount,
    },
    /// An account's admission changed (or was restated).
    WhitelistUpdated {
        /// Account concerned.
        account: AccountId,
        /// New admission status.
        admitted: bool,
    },
    /// A purchase was accepted.
    TokensPurchased {
        /// Account that paid.
        payer: AccountId,
        /// Account credited.
        beneficiary: AccountId,
        /// Contribution consumed.
        #[serde(with = "dec_str")]
        cost: Amount,
        /// Units credited.
        #[serde(with = "dec_str")]
        units: Amount,
    },
    /// The window moved.
    SaleWindowUpdated {
        /// New opening time.
        start_time: DateTime<Utc>,
        /// New closing time.
        end_time: DateTime<Utc>,
    },
    /// The bonus changed.
    BonusUpdated {
        /// New bonus in basis points.
        bonus_bps: u32,
    },
    /// The rate changed.
    TokensPerKEtherUpdated {
        /// New rate.
        tokens_per_kether: u64,
    },
    /// The per-account cap changed.
    MaxUnitsPerAccountUpdated {
        /// New cap (zero = unlimited).
        #[serde(with = "dec_str")]
        max_units_per_account: Amount,
    },
    /// The settlement wallet changed.
    WalletAddressUpdated {
        /// New wallet.
        wallet: AccountId,
    },
    /// Purchases were halted.
    Suspended,
    /// Purchases were resumed.
    Resumed,
    /// Unsold units went back to the owner.
    TokensReclaimed {
        /// Amount returned.
        #[serde(with = "dec_str")]
        amount: Amount,
    },
    /// The sale ended for good.
    Finalized,
    /// A role changed.
    Roles(RoleEvent),
}

/// Serializable view of the sale engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleSnapshot {
    /// Engine's own address.
    pub address: AccountId,
    /// Lifecycle state at snapshot time.
    pub state: SaleState,
    /// Bound ledger.
    pub ledger: Option<AccountId>,
    /// Settlement wallet.
    pub wallet: AccountId,
    /// Current owner.
    pub owner: AccountId,
    /// Current operations delegate.
    pub operations: Option<AccountId>,
    /// Current parameters.
    pub config: SaleConfig,
    /// Conversion factor, once bound.
    #[serde(with = "option_dec_str", skip_serializing_if = "Option::is_none")]
    pub conversion_factor: Option<Amount>,
    /// Cumulative units sold.
    #[serde(with = "dec_str")]
    pub total_units_sold: Amount,
    /// Cumulative contribution collected.
    #[serde(with = "dec_str")]
    pub total_contribution: Amount,
    /// Admitted accounts.
    pub whitelist: Vec<AccountId>,
}

mod option_dec_str {
    use serde::Serializer;

    use tally_shared::Amount;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Amount>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(amount) => serializer.collect_str(amount),
            None => serializer.serialize_none(),
        }
    }
}
