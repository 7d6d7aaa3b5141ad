//! Ledger domain types.

use serde::Serialize;

use tally_shared::config::LedgerSettings;
use tally_shared::types::amount::{dec_str, scale_units};
use tally_shared::{AccountId, Amount};

use super::error::LedgerError;
use crate::roles::RoleEvent;

/// Parameters fixed at ledger creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Name of the unit.
    pub name: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Decimals of one whole unit.
    pub decimals: u32,
    /// Supply minted to the owner, in base units.
    pub initial_supply: Amount,
}

impl LedgerConfig {
    /// Builds the ledger parameters from settings, scaling the whole-unit
    /// supply by the configured decimals.
    pub fn from_settings(settings: &LedgerSettings) -> Result<Self, LedgerError> {
        let initial_supply = scale_units(settings.initial_supply, settings.decimals)
            .map_err(|_| LedgerError::ArithmeticOverflow)?;
        Ok(Self {
            name: settings.name.clone(),
            symbol: settings.symbol.clone(),
            decimals: settings.decimals,
            initial_supply,
        })
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::from_settings(&LedgerSettings::default()).unwrap_or_else(|_| Self {
            name: String::new(),
            symbol: String::new(),
            decimals: 0,
            initial_supply: Amount::zero(),
        })
    }
}

/// Events emitted by the ledger, one per state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Units moved between accounts (`from` is ZERO at mint).
    Transfer {
        /// Debited account.
        from: AccountId,
        /// Credited account.
        to: AccountId,
        /// Amount moved.
        #[serde(with = "dec_str")]
        amount: Amount,
    },
    /// An allowance was set.
    Approval {
        /// Account whose units may be spent.
        owner: AccountId,
        /// Account allowed to spend them.
        spender: AccountId,
        /// New allowance.
        #[serde(with = "dec_str")]
        amount: Amount,
    },
    /// Units were destroyed.
    Burn {
        /// Account that burned its units.
        burner: AccountId,
        /// Amount destroyed.
        #[serde(with = "dec_str")]
        amount: Amount,
    },
    /// Transfers were halted for good.
    Frozen,
    /// Transfer gating was lifted for good.
    Finalized,
    /// Units held at the ledger's own address were returned to the owner.
    Reclaimed {
        /// Amount returned.
        #[serde(with = "dec_str")]
        amount: Amount,
    },
    /// A role changed.
    Roles(RoleEvent),
}

/// Serializable view of the ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    /// Ledger's own address.
    pub address: AccountId,
    /// Name of the unit.
    pub name: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Decimals of one whole unit.
    pub decimals: u32,
    /// Current total supply.
    #[serde(with = "dec_str")]
    pub total_supply: Amount,
    /// Current owner.
    pub owner: AccountId,
    /// Current operations delegate.
    pub operations: Option<AccountId>,
    /// Whether transfers are halted.
    pub frozen: bool,
    /// Whether transfer gating is lifted.
    pub finalized: bool,
    /// Non-zero balances, ordered by account.
    pub balances: Vec<Holding>,
}

/// One non-zero balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Holding {
    /// Holder.
    pub account: AccountId,
    /// Balance in base units.
    #[serde(with = "dec_str")]
    pub balance: Amount,
}
