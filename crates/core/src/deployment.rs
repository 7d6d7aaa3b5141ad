//! Serialized host for one ledger and its sale engine.
//!
//! Every operation takes the same lock, so the cap read and the credit of a
//! purchase happen inside one critical section and two purchases can never
//! interleave against a stale balance.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::info;

use tally_shared::types::amount::scale_units;
use tally_shared::{AccountId, Amount, AppConfig};

use crate::clock::Clock;
use crate::ledger::{Ledger, LedgerConfig, LedgerError, LedgerSnapshot};
use crate::sale::{
    ImportError, ImportReport, PurchaseReceipt, SaleConfig, SaleEngine, SaleError, SaleSnapshot,
    WhitelistImport,
};

/// Everything needed to bring up a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    /// Ledger parameters.
    pub ledger: LedgerConfig,
    /// Sale parameters.
    pub sale: SaleConfig,
    /// Owner of both components.
    pub owner: AccountId,
    /// Operations delegate of the sale engine.
    pub operations: AccountId,
    /// Settlement wallet of the sale engine.
    pub wallet: AccountId,
    /// Units moved to the sale engine at launch, in base units.
    pub initial_allocation: Amount,
}

impl DeploymentPlan {
    /// Builds a plan from application configuration.
    pub fn from_config(
        config: &AppConfig,
        owner: AccountId,
        operations: AccountId,
        wallet: AccountId,
    ) -> Result<Self, LedgerError> {
        let ledger = LedgerConfig::from_settings(&config.ledger)?;
        let initial_allocation = scale_units(config.sale.initial_allocation, ledger.decimals)
            .map_err(|_| LedgerError::ArithmeticOverflow)?;
        Ok(Self {
            ledger,
            sale: SaleConfig::from_settings(&config.sale),
            owner,
            operations,
            wallet,
            initial_allocation,
        })
    }
}

/// Combined view of both components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentSnapshot {
    /// Ledger state.
    pub ledger: LedgerSnapshot,
    /// Sale engine state.
    pub sale: SaleSnapshot,
}

#[derive(Debug)]
struct Components {
    ledger: Ledger,
    sale: SaleEngine,
}

/// One ledger and one sale engine behind a single lock.
#[derive(Debug)]
pub struct Deployment {
    inner: Mutex<Components>,
}

impl Deployment {
    /// Wraps already wired components.
    #[must_use]
    pub fn new(ledger: Ledger, sale: SaleEngine) -> Self {
        Self {
            inner: Mutex::new(Components { ledger, sale }),
        }
    }

    /// Creates both components and wires them:
    /// 1. ledger mints the supply to the owner
    /// 2. sale engine binds to the ledger
    /// 3. sale engine becomes the ledger's operations delegate
    /// 4. the sale engine's own delegate is set
    /// 5. the initial allocation moves to the sale engine
    pub fn launch(plan: DeploymentPlan, clock: Arc<dyn Clock>) -> Result<Self, SaleError> {
        let owner = plan.owner;
        let mut ledger = Ledger::new(plan.ledger, owner)?;
        let mut sale = SaleEngine::new(plan.sale, owner, plan.wallet, clock)?;

        sale.initialize(owner, &ledger)?;
        ledger.set_operations(owner, sale.address())?;
        sale.set_operations(owner, plan.operations)?;
        if !plan.initial_allocation.is_zero() {
            ledger.transfer(owner, sale.address(), plan.initial_allocation)?;
        }

        info!(
            ledger = %ledger.address(),
            sale = %sale.address(),
            allocation = %plan.initial_allocation,
            "Deployment launched"
        );
        Ok(Self::new(ledger, sale))
    }

    /// Runs `f` with exclusive access to both components.
    pub fn with<R>(&self, f: impl FnOnce(&mut Ledger, &mut SaleEngine) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Components { ledger, sale } = &mut *guard;
        f(ledger, sale)
    }

    /// Consumes the deployment, returning both components.
    #[must_use]
    pub fn into_parts(self) -> (Ledger, SaleEngine) {
        let components = self
            .inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        (components.ledger, components.sale)
    }

    /// Ledger address.
    #[must_use]
    pub fn ledger_address(&self) -> AccountId {
        self.with(|ledger, _| ledger.address())
    }

    /// Sale engine address.
    #[must_use]
    pub fn sale_address(&self) -> AccountId {
        self.with(|_, sale| sale.address())
    }

    /// Ledger balance of `account`.
    #[must_use]
    pub fn balance_of(&self, account: AccountId) -> Amount {
        self.with(|ledger, _| ledger.balance_of(account))
    }

    /// Combined snapshot.
    #[must_use]
    pub fn snapshot(&self) -> DeploymentSnapshot {
        self.with(|ledger, sale| DeploymentSnapshot {
            ledger: ledger.snapshot(),
            sale: sale.snapshot(),
        })
    }

    /// See [`SaleEngine::purchase`].
    pub fn purchase(
        &self,
        payer: AccountId,
        beneficiary: AccountId,
        contribution: Amount,
    ) -> Result<PurchaseReceipt, SaleError> {
        self.with(|ledger, sale| sale.purchase(ledger, payer, beneficiary, contribution))
    }

    /// See [`Ledger::transfer`].
    pub fn transfer(
        &self,
        caller: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.with(|ledger, _| ledger.transfer(caller, to, amount))
    }

    /// See [`Ledger::burn`].
    pub fn burn(&self, caller: AccountId, amount: Amount) -> Result<(), LedgerError> {
        self.with(|ledger, _| ledger.burn(caller, amount))
    }

    /// See [`SaleEngine::update_whitelist`].
    pub fn update_whitelist(
        &self,
        caller: AccountId,
        account: AccountId,
        admitted: bool,
    ) -> Result<(), SaleError> {
        self.with(|_, sale| sale.update_whitelist(caller, account, admitted))
    }

    /// See [`SaleEngine::update_whitelist_batch`].
    pub fn update_whitelist_batch(
        &self,
        caller: AccountId,
        accounts: &[AccountId],
        admitted: bool,
    ) -> Result<(), SaleError> {
        self.with(|_, sale| sale.update_whitelist_batch(caller, accounts, admitted))
    }

    /// Applies a whitelist import as `caller`.
    pub fn import_whitelist(
        &self,
        caller: AccountId,
        import: &WhitelistImport,
    ) -> Result<ImportReport, ImportError> {
        self.with(|_, sale| import.apply(sale, caller))
    }

    /// See [`SaleEngine::reclaim_unsold`].
    pub fn reclaim_unsold(&self, caller: AccountId) -> Result<bool, SaleError> {
        self.with(|ledger, sale| sale.reclaim_unsold(caller, ledger))
    }
}
