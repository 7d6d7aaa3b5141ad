//! Whitelist import planner.
//!
//! Takes a list of `{address, status}` entries, splits it against the
//! current whitelist into accounts to add, to remove and to leave alone,
//! then drives batch updates in chunks of bounded size.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::info;

use tally_shared::AccountId;

use super::engine::SaleEngine;
use super::error::SaleError;
use crate::error::ErrorKind;

/// Errors raised while planning or applying an import.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    /// The import list has no entries.
    #[error("Whitelist import is empty")]
    EmptyList,

    /// The same address appears more than once.
    #[error("Duplicate whitelist entry: {0}")]
    DuplicateEntry(AccountId),

    /// Batch size must be at least one.
    #[error("Batch size must be at least 1")]
    InvalidBatchSize,

    /// After applying a batch, an account did not have the expected status.
    #[error("Whitelist status of {0} does not match after update")]
    Verification(AccountId),

    /// The sale engine rejected a batch.
    #[error(transparent)]
    Sale(#[from] SaleError),
}

impl ImportError {
    /// Returns the error code for reports.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyList => "EMPTY_LIST",
            Self::DuplicateEntry(_) => "DUPLICATE_ENTRY",
            Self::InvalidBatchSize => "INVALID_BATCH_SIZE",
            Self::Verification(_) => "VERIFICATION_FAILED",
            Self::Sale(inner) => inner.error_code(),
        }
    }

    /// Returns the error classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyList | Self::DuplicateEntry(_) | Self::InvalidBatchSize => ErrorKind::Input,
            Self::Verification(_) => ErrorKind::Internal,
            Self::Sale(inner) => inner.kind(),
        }
    }
}

/// One line of an import file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    /// Account concerned.
    pub address: AccountId,
    /// Desired admission status.
    pub status: bool,
}

/// Partition of an import against the current whitelist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportPlan {
    /// Accounts to admit.
    pub to_add: Vec<AccountId>,
    /// Accounts to drop.
    pub to_remove: Vec<AccountId>,
    /// Accounts already in the desired state.
    pub unchanged: Vec<AccountId>,
    /// Admission batches, in submission order.
    pub add_batches: Vec<Vec<AccountId>>,
    /// Removal batches, in submission order.
    pub remove_batches: Vec<Vec<AccountId>>,
}

impl ImportPlan {
    /// Total number of batch updates the plan sends.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.add_batches.len() + self.remove_batches.len()
    }
}

/// Outcome of an applied import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Accounts admitted.
    pub added: Vec<AccountId>,
    /// Accounts dropped.
    pub removed: Vec<AccountId>,
    /// Accounts left alone.
    pub unchanged: Vec<AccountId>,
    /// Batch updates sent.
    pub batches: usize,
}

/// Validated whitelist import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistImport {
    entries: Vec<WhitelistEntry>,
    max_batch_size: usize,
}

impl WhitelistImport {
    /// Validates an import list.
    ///
    /// # Errors
    ///
    /// - `EmptyList` if there are no entries
    /// - `DuplicateEntry` if an address is listed twice
    /// - `InvalidBatchSize` if `max_batch_size` is zero
    pub fn new(entries: Vec<WhitelistEntry>, max_batch_size: usize) -> Result<Self, ImportError> {
        if max_batch_size == 0 {
            return Err(ImportError::InvalidBatchSize);
        }
        if entries.is_empty() {
            return Err(ImportError::EmptyList);
        }
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.address) {
                return Err(ImportError::DuplicateEntry(entry.address));
            }
        }
        Ok(Self {
            entries,
            max_batch_size,
        })
    }

    /// Validated entries, in file order.
    #[must_use]
    pub fn entries(&self) -> &[WhitelistEntry] {
        &self.entries
    }

    /// Splits the entries against the current whitelist of `sale`.
    #[must_use]
    pub fn plan(&self, sale: &SaleEngine) -> ImportPlan {
        let mut plan = ImportPlan::default();
        for entry in &self.entries {
            let current = sale.is_whitelisted(entry.address);
            if current == entry.status {
                plan.unchanged.push(entry.address);
            } else if entry.status {
                plan.to_add.push(entry.address);
            } else {
                plan.to_remove.push(entry.address);
            }
        }
        plan.add_batches = chunk(&plan.to_add, self.max_batch_size);
        plan.remove_batches = chunk(&plan.to_remove, self.max_batch_size);
        plan
    }

    /// Plans the import and sends every batch as `caller`, checking the
    /// resulting status of each account.
    pub fn apply(
        &self,
        sale: &mut SaleEngine,
        caller: AccountId,
    ) -> Result<ImportReport, ImportError> {
        let plan = self.plan(sale);
        info!(
            add = plan.to_add.len(),
            remove = plan.to_remove.len(),
            unchanged = plan.unchanged.len(),
            batches = plan.batch_count(),
            "Whitelist import planned"
        );

        let mut batches = 0;
        let passes = [(&plan.add_batches, true), (&plan.remove_batches, false)];
        for (chunks, status) in passes {
            for (index, batch) in chunks.iter().enumerate() {
                sale.update_whitelist_batch(caller, batch, status)?;
                if let Some(mismatch) = batch.iter().find(|a| sale.is_whitelisted(**a) != status) {
                    return Err(ImportError::Verification(*mismatch));
                }
                batches += 1;
                info!(
                    batch = index + 1,
                    of = chunks.len(),
                    size = batch.len(),
                    status,
                    "Whitelist batch sent"
                );
            }
        }

        Ok(ImportReport {
            added: plan.to_add,
            removed: plan.to_remove,
            unchanged: plan.unchanged,
            batches,
        })
    }
}

fn chunk(accounts: &[AccountId], size: usize) -> Vec<Vec<AccountId>> {
    accounts.chunks(size).map(<[AccountId]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::{Ledger, LedgerConfig};
    use crate::sale::SaleConfig;
    use std::sync::Arc;
    use tally_shared::config::WhitelistSettings;

    const OWNER: AccountId = AccountId::from_u128(1);
    const OPS: AccountId = AccountId::from_u128(2);
    const WALLET: AccountId = AccountId::from_u128(3);

    fn account(n: u128) -> AccountId {
        AccountId::from_u128(1_000 + n)
    }

    fn entry(n: u128, status: bool) -> WhitelistEntry {
        WhitelistEntry {
            address: account(n),
            status,
        }
    }

    fn sale() -> SaleEngine {
        let config = SaleConfig::default();
        let clock = Arc::new(ManualClock::new(config.start_time));
        let ledger = Ledger::new(LedgerConfig::default(), OWNER).unwrap();
        let mut sale = SaleEngine::new(config, OWNER, WALLET, clock).unwrap();
        sale.set_operations(OWNER, OPS).unwrap();
        sale.initialize(OWNER, &ledger).unwrap();
        sale
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            WhitelistImport::new(vec![], 30),
            Err(ImportError::EmptyList)
        );
        assert_eq!(
            WhitelistImport::new(vec![entry(1, true)], 0),
            Err(ImportError::InvalidBatchSize)
        );
        assert_eq!(
            WhitelistImport::new(vec![entry(1, true), entry(2, true), entry(1, false)], 30),
            Err(ImportError::DuplicateEntry(account(1)))
        );
    }

    #[test]
    fn test_plan_partitions_against_current_state() {
        let mut sale = sale();
        sale.update_whitelist_batch(OPS, &[account(1), account(2)], true)
            .unwrap();

        let import = WhitelistImport::new(
            vec![
                entry(1, true),
                entry(2, false),
                entry(3, true),
                entry(4, false),
            ],
            30,
        )
        .unwrap();
        let plan = import.plan(&sale);

        assert_eq!(plan.to_add, vec![account(3)]);
        assert_eq!(plan.to_remove, vec![account(2)]);
        assert_eq!(plan.unchanged, vec![account(1), account(4)]);
        assert_eq!(plan.batch_count(), 2);
    }

    #[test]
    fn test_apply_chunks_batches() {
        let mut sale = sale();
        let entries: Vec<_> = (0..75).map(|n| entry(n, true)).collect();
        let batch_size = WhitelistSettings::default().max_batch_size;
        let import = WhitelistImport::new(entries, batch_size).unwrap();

        let plan = import.plan(&sale);
        let sizes: Vec<_> = plan.add_batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![30, 30, 15]);

        let mark = sale.events().len();
        let report = import.apply(&mut sale, OPS).unwrap();
        assert_eq!(report.added.len(), 75);
        assert_eq!(report.batches, 3);
        assert_eq!(sale.events().len(), mark + 75);
        assert_eq!(sale.whitelisted().count(), 75);
    }

    #[test]
    fn test_rerun_is_noop() {
        let mut sale = sale();
        let import =
            WhitelistImport::new(vec![entry(1, true), entry(2, true)], 30).unwrap();
        import.apply(&mut sale, OWNER).unwrap();
        let events = sale.events().len();

        let report = import.apply(&mut sale, OWNER).unwrap();
        assert_eq!(report.batches, 0);
        assert_eq!(report.unchanged.len(), 2);
        assert_eq!(sale.events().len(), events);
    }

    #[test]
    fn test_apply_surfaces_sale_rejections() {
        let mut sale = sale();
        let import = WhitelistImport::new(vec![entry(1, true)], 30).unwrap();
        assert_eq!(
            import.apply(&mut sale, account(9)),
            Err(ImportError::Sale(SaleError::Unauthorized(account(9))))
        );

        let import = WhitelistImport::new(
            vec![WhitelistEntry {
                address: WALLET,
                status: true,
            }],
            30,
        )
        .unwrap();
        let err = import.apply(&mut sale, OWNER).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TARGET");
    }

    #[test]
    fn test_entries_deserialize() {
        let json = r#"[{"address":"00000000-0000-0000-0000-0000000003e9","status":true}]"#;
        let entries: Vec<WhitelistEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries, vec![entry(1, true)]);
    }
}
