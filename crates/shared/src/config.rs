//! Application configuration management.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::amount::{self, Amount};

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Ledger configuration.
    #[serde(default)]
    pub ledger: LedgerSettings,
    /// Sale engine configuration.
    #[serde(default)]
    pub sale: SaleSettings,
    /// Whitelist import configuration.
    #[serde(default)]
    pub whitelist: WhitelistSettings,
}

/// Ledger configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSettings {
    /// Human readable name of the unit.
    #[serde(default = "default_name")]
    pub name: String,
    /// Ticker symbol of the unit.
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Number of decimals of one whole unit.
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    /// Supply minted to the owner at creation, in whole units.
    #[serde(default = "default_initial_supply")]
    pub initial_supply: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            symbol: default_symbol(),
            decimals: default_decimals(),
            initial_supply: default_initial_supply(),
        }
    }
}

fn default_name() -> String {
    "Tally Unit".to_string()
}

fn default_symbol() -> String {
    "TLY".to_string()
}

fn default_decimals() -> u32 {
    18
}

fn default_initial_supply() -> u64 {
    150_000_000
}

/// Sale engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SaleSettings {
    /// Opening of the sale window (inclusive).
    #[serde(default = "default_start_time")]
    pub start_time: DateTime<Utc>,
    /// Closing of the sale window (inclusive).
    #[serde(default = "default_end_time")]
    pub end_time: DateTime<Utc>,
    /// Whole ledger units granted per 1,000 whole units of contribution.
    #[serde(default = "default_tokens_per_kether")]
    pub tokens_per_kether: u64,
    /// Bonus in basis points (10,000 = +100%).
    #[serde(default)]
    pub bonus_bps: u32,
    /// Per-account cap in base units (0 = unlimited).
    #[serde(default, with = "amount::dec_str")]
    pub max_units_per_account: Amount,
    /// Minimum contribution in base units of the contribution currency.
    #[serde(default = "default_contribution_min", with = "amount::dec_str")]
    pub contribution_min: Amount,
    /// Whole units transferred to the sale engine at deployment.
    #[serde(default = "default_initial_allocation")]
    pub initial_allocation: u64,
}

impl Default for SaleSettings {
    fn default() -> Self {
        Self {
            start_time: default_start_time(),
            end_time: default_end_time(),
            tokens_per_kether: default_tokens_per_kether(),
            bonus_bps: 0,
            max_units_per_account: Amount::zero(),
            contribution_min: default_contribution_min(),
            initial_allocation: default_initial_allocation(),
        }
    }
}

fn default_start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_516_579_200, 0).unwrap_or_default() // 2018-01-22T00:00:00Z
}

fn default_end_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_518_825_600, 0).unwrap_or_default() // 2018-02-17T00:00:00Z
}

fn default_tokens_per_kether() -> u64 {
    10_000
}

fn default_contribution_min() -> Amount {
    // 0.1 of a contribution unit with 18 decimals
    Amount::from(100_000_000_000_000_000u64)
}

fn default_initial_allocation() -> u64 {
    1_000_000
}

/// Whitelist import configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WhitelistSettings {
    /// Maximum number of accounts sent in a single batch update.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for WhitelistSettings {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
        }
    }
}

fn default_max_batch_size() -> usize {
    30
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally layering an explicit file on top of
    /// the default and run-mode files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load_from(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false));

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("TALLY").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
