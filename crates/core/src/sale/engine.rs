//! The sale engine: whitelist, window, rate and cap enforcement.
//!
//! The engine holds a ledger balance like any other account and only ever
//! moves units through [`Ledger::transfer`]. It must be the ledger's
//! operations delegate (or the ledger must be finalized) for purchases to
//! go through.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use tally_shared::{AccountId, Amount};

use super::error::SaleError;
use super::pricing::{MAX_BONUS_BPS, Pricing, conversion_factor};
use super::types::{PurchaseReceipt, SaleConfig, SaleEvent, SaleSnapshot, SaleState};
use crate::clock::Clock;
use crate::events::EventLog;
use crate::latch::Latch;
use crate::ledger::Ledger;
use crate::roles::{RoleEvent, Roles};

/// Ledger the engine is bound to, fixed at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LedgerBinding {
    address: AccountId,
    factor: Amount,
}

/// Whitelist-gated, time-boxed distribution engine.
#[derive(Debug, Clone)]
pub struct SaleEngine {
    address: AccountId,
    roles: Roles,
    config: SaleConfig,
    wallet: AccountId,
    binding: Option<LedgerBinding>,
    suspended: bool,
    finalized: Latch,
    whitelist: BTreeSet<AccountId>,
    total_units_sold: Amount,
    total_contribution: Amount,
    clock: Arc<dyn Clock>,
    events: EventLog<SaleEvent>,
}

impl SaleEngine {
    /// Creates an engine at a fresh address.
    pub fn new(
        config: SaleConfig,
        owner: AccountId,
        wallet: AccountId,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SaleError> {
        Self::with_address(config, owner, wallet, clock, AccountId::new())
    }

    /// Creates an engine at a given address.
    ///
    /// # Errors
    ///
    /// - `InvalidTarget` for a null owner, address or wallet, or when the
    ///   wallet is the engine itself or the owner
    /// - `InvalidWindow`, `InvalidAmount` for out-of-range parameters
    pub fn with_address(
        config: SaleConfig,
        owner: AccountId,
        wallet: AccountId,
        clock: Arc<dyn Clock>,
        address: AccountId,
    ) -> Result<Self, SaleError> {
        let roles = Roles::new(owner)?;
        if address.is_zero() || address == owner {
            return Err(SaleError::InvalidTarget(address));
        }
        if wallet.is_zero() || wallet == address || wallet == owner {
            return Err(SaleError::InvalidTarget(wallet));
        }
        validate_window(config.start_time, config.end_time)?;
        validate_rate(config.tokens_per_kether)?;
        validate_bonus(config.bonus_bps)?;

        Ok(Self {
            address,
            roles,
            config,
            wallet,
            binding: None,
            suspended: false,
            finalized: Latch::new(),
            whitelist: BTreeSet::new(),
            total_units_sold: Amount::zero(),
            total_contribution: Amount::zero(),
            clock,
            events: EventLog::new(),
        })
    }

    // ========== Read model ==========

    /// Engine's own address.
    #[must_use]
    pub const fn address(&self) -> AccountId {
        self.address
    }

    /// Settlement wallet.
    #[must_use]
    pub const fn wallet(&self) -> AccountId {
        self.wallet
    }

    /// Current parameters.
    #[must_use]
    pub const fn config(&self) -> &SaleConfig {
        &self.config
    }

    /// Role table.
    #[must_use]
    pub const fn roles(&self) -> &Roles {
        &self.roles
    }

    /// Current owner.
    #[must_use]
    pub const fn owner(&self) -> AccountId {
        self.roles.owner()
    }

    /// Bound ledger, once initialized.
    #[must_use]
    pub fn ledger_address(&self) -> Option<AccountId> {
        self.binding.map(|binding| binding.address)
    }

    /// Conversion factor, once initialized.
    #[must_use]
    pub fn conversion_factor(&self) -> Option<Amount> {
        self.binding.map(|binding| binding.factor)
    }

    /// Whether purchases are suspended.
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Whether the sale is finalized.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized.is_engaged()
    }

    /// Cumulative units sold.
    #[must_use]
    pub const fn total_units_sold(&self) -> Amount {
        self.total_units_sold
    }

    /// Cumulative contribution collected.
    #[must_use]
    pub const fn total_contribution(&self) -> Amount {
        self.total_contribution
    }

    /// Whether `account` is admitted. Absent accounts are not.
    #[must_use]
    pub fn is_whitelisted(&self, account: AccountId) -> bool {
        self.whitelist.contains(&account)
    }

    /// Admitted accounts, ordered.
    pub fn whitelisted(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.whitelist.iter().copied()
    }

    /// Emitted events.
    #[must_use]
    pub const fn events(&self) -> &EventLog<SaleEvent> {
        &self.events
    }

    /// Lifecycle state according to the engine's clock.
    #[must_use]
    pub fn state(&self) -> SaleState {
        self.state_at(self.clock.now())
    }

    /// Lifecycle state at `now`.
    #[must_use]
    pub fn state_at(&self, now: DateTime<Utc>) -> SaleState {
        if self.is_finalized() {
            SaleState::Finalized
        } else if self.binding.is_none() {
            SaleState::Uninitialized
        } else if now > self.config.end_time {
            SaleState::Closed
        } else if self.suspended {
            SaleState::Suspended
        } else if now < self.config.start_time {
            SaleState::Configured
        } else {
            SaleState::Open
        }
    }

    /// Units a contribution would buy before any cap applies.
    pub fn quote(&self, contribution: Amount) -> Result<Amount, SaleError> {
        let binding = self.binding.ok_or(SaleError::NotInitialized)?;
        self.pricing(binding.factor).units_for(contribution)
    }

    /// Serializable view of the current state.
    #[must_use]
    pub fn snapshot(&self) -> SaleSnapshot {
        SaleSnapshot {
            address: self.address,
            state: self.state(),
            ledger: self.ledger_address(),
            wallet: self.wallet,
            owner: self.roles.owner(),
            operations: self.roles.operations(),
            config: self.config.clone(),
            conversion_factor: self.conversion_factor(),
            total_units_sold: self.total_units_sold,
            total_contribution: self.total_contribution,
            whitelist: self.whitelisted().collect(),
        }
    }

    // ========== Lifecycle ==========

    /// Binds the engine to `ledger` and fixes the conversion factor. Owner
    /// only, once.
    pub fn initialize(&mut self, caller: AccountId, ledger: &Ledger) -> Result<(), SaleError> {
        self.ensure_not_finalized()?;
        self.roles.require_owner(caller)?;
        if self.binding.is_some() {
            return Err(SaleError::AlreadyInitialized);
        }
        if ledger.address() == self.address || ledger.address() == self.wallet {
            return Err(SaleError::InvalidTarget(ledger.address()));
        }

        let factor = conversion_factor(ledger.decimals())?;
        self.binding = Some(LedgerBinding {
            address: ledger.address(),
            factor,
        });
        self.events.push(SaleEvent::Initialized {
            ledger: ledger.address(),
            conversion_factor: factor,
        });

        info!(sale = %self.address, ledger = %ledger.address(), factor = %factor, "Sale initialized");
        Ok(())
    }

    /// Ends the sale for good. Owner only.
    pub fn finalize(&mut self, caller: AccountId) -> Result<(), SaleError> {
        self.roles.require_owner(caller)?;
        if !self.finalized.engage() {
            return Err(SaleError::AlreadyFinalized);
        }
        self.events.push(SaleEvent::Finalized);
        info!(
            sale = %self.address,
            units_sold = %self.total_units_sold,
            contribution = %self.total_contribution,
            "Sale finalized"
        );
        Ok(())
    }

    /// Halts purchases. Owner only.
    pub fn suspend(&mut self, caller: AccountId) -> Result<(), SaleError> {
        self.ensure_not_finalized()?;
        self.roles.require_owner(caller)?;
        if self.suspended {
            return Err(SaleError::InvalidTransition { action: "suspend" });
        }
        self.suspended = true;
        self.events.push(SaleEvent::Suspended);
        info!(sale = %self.address, "Sale suspended");
        Ok(())
    }

    /// Resumes purchases. Owner only.
    pub fn resume(&mut self, caller: AccountId) -> Result<(), SaleError> {
        self.ensure_not_finalized()?;
        self.roles.require_owner(caller)?;
        if !self.suspended {
            return Err(SaleError::InvalidTransition { action: "resume" });
        }
        self.suspended = false;
        self.events.push(SaleEvent::Resumed);
        info!(sale = %self.address, "Sale resumed");
        Ok(())
    }

    // ========== Administrative setters ==========

    /// Moves the sale window. Owner only.
    pub fn set_sale_window(
        &mut self,
        caller: AccountId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<(), SaleError> {
        self.ensure_not_finalized()?;
        self.roles.require_owner(caller)?;
        validate_window(start_time, end_time)?;

        self.config.start_time = start_time;
        self.config.end_time = end_time;
        self.events.push(SaleEvent::SaleWindowUpdated {
            start_time,
            end_time,
        });
        info!(start = %start_time, end = %end_time, "Sale window updated");
        Ok(())
    }

    /// Replaces the bonus (basis points, at most +100%). Owner only.
    pub fn set_bonus(&mut self, caller: AccountId, bonus_bps: u32) -> Result<(), SaleError> {
        self.ensure_not_finalized()?;
        self.roles.require_owner(caller)?;
        validate_bonus(bonus_bps)?;

        self.config.bonus_bps = bonus_bps;
        self.events.push(SaleEvent::BonusUpdated { bonus_bps });
        info!(bonus_bps, "Bonus updated");
        Ok(())
    }

    /// Replaces the rate. Owner only.
    pub fn set_tokens_per_kether(
        &mut self,
        caller: AccountId,
        tokens_per_kether: u64,
    ) -> Result<(), SaleError> {
        self.ensure_not_finalized()?;
        self.roles.require_owner(caller)?;
        validate_rate(tokens_per_kether)?;

        self.config.tokens_per_kether = tokens_per_kether;
        self.events
            .push(SaleEvent::TokensPerKEtherUpdated { tokens_per_kether });
        info!(tokens_per_kether, "Rate updated");
        Ok(())
    }

    /// Replaces the per-account cap (zero = unlimited). Owner only.
    pub fn set_max_units_per_account(
        &mut self,
        caller: AccountId,
        max_units_per_account: Amount,
    ) -> Result<(), SaleError> {
        self.ensure_not_finalized()?;
        self.roles.require_owner(caller)?;

        self.config.max_units_per_account = max_units_per_account;
        self.events.push(SaleEvent::MaxUnitsPerAccountUpdated {
            max_units_per_account,
        });
        info!(cap = %max_units_per_account, "Per-account cap updated");
        Ok(())
    }

    /// Replaces the settlement wallet. Owner only.
    ///
    /// The wallet may not be the null identifier, the engine, the bound
    /// ledger, a role holder or an admitted account.
    pub fn set_wallet_address(
        &mut self,
        caller: AccountId,
        wallet: AccountId,
    ) -> Result<(), SaleError> {
        self.ensure_not_finalized()?;
        self.roles.require_owner(caller)?;
        let is_ledger = self.binding.is_some_and(|binding| binding.address == wallet);
        if wallet.is_zero()
            || wallet == self.address
            || is_ledger
            || self.roles.is_owner_or_operations(wallet)
            || self.is_whitelisted(wallet)
        {
            return Err(SaleError::InvalidTarget(wallet));
        }

        self.wallet = wallet;
        self.events.push(SaleEvent::WalletAddressUpdated { wallet });
        info!(wallet = %wallet, "Wallet updated");
        Ok(())
    }

    // ========== Roles ==========

    /// Replaces the operations delegate. Owner only.
    pub fn set_operations(
        &mut self,
        caller: AccountId,
        operations: AccountId,
    ) -> Result<(), SaleError> {
        if operations == self.address || operations == self.wallet {
            return Err(SaleError::InvalidTarget(operations));
        }
        let event = self.roles.set_operations(caller, operations)?;
        self.record_role_event(event);
        Ok(())
    }

    /// Proposes a new owner. Owner only.
    pub fn propose_owner(
        &mut self,
        caller: AccountId,
        proposed: AccountId,
    ) -> Result<(), SaleError> {
        if proposed == self.address || proposed == self.wallet {
            return Err(SaleError::InvalidTarget(proposed));
        }
        let event = self.roles.propose_owner(caller, proposed)?;
        self.record_role_event(event);
        Ok(())
    }

    /// Accepts a pending ownership proposal.
    pub fn accept_ownership(&mut self, caller: AccountId) -> Result<(), SaleError> {
        let event = self.roles.accept_ownership(caller)?;
        self.record_role_event(event);
        Ok(())
    }

    // ========== Whitelist ==========

    /// Sets the admission of one account. Owner or operations delegate.
    ///
    /// Restating the current status is allowed and still emits an event.
    pub fn update_whitelist(
        &mut self,
        caller: AccountId,
        account: AccountId,
        admitted: bool,
    ) -> Result<(), SaleError> {
        self.ensure_not_finalized()?;
        self.roles.require_owner_or_operations(caller)?;
        self.check_whitelist_target(account)?;

        self.set_admission(account, admitted);
        Ok(())
    }

    /// Sets the admission of every listed account, in order. Owner or
    /// operations delegate.
    ///
    /// Every entry is validated before any is applied.
    pub fn update_whitelist_batch(
        &mut self,
        caller: AccountId,
        accounts: &[AccountId],
        admitted: bool,
    ) -> Result<(), SaleError> {
        self.ensure_not_finalized()?;
        self.roles.require_owner_or_operations(caller)?;
        if accounts.is_empty() {
            return Err(SaleError::EmptyBatch);
        }
        for account in accounts {
            self.check_whitelist_target(*account)?;
        }

        for account in accounts {
            self.set_admission(*account, admitted);
        }
        info!(count = accounts.len(), admitted, "Whitelist batch applied");
        Ok(())
    }

    // ========== Purchases ==========

    /// Sells units to `beneficiary` for `contribution` paid by `payer`.
    ///
    /// Steps, in order:
    /// 1. the sale must be open and bound to `ledger`
    /// 2. the contribution must reach the minimum
    /// 3. both payer and beneficiary must be admitted
    /// 4. units = contribution × rate × (1 + bonus) ÷ factor
    /// 5. with a cap, a beneficiary already at the cap is rejected and one
    ///    below it is filled up to exactly the cap, the rest refunded
    /// 6. units move from the engine's balance through the ledger
    /// 7. running totals grow by what was actually credited and consumed
    ///
    /// Nothing changes when an error is returned.
    pub fn purchase(
        &mut self,
        ledger: &mut Ledger,
        payer: AccountId,
        beneficiary: AccountId,
        contribution: Amount,
    ) -> Result<PurchaseReceipt, SaleError> {
        let result = self.try_purchase(ledger, payer, beneficiary, contribution);
        if let Err(err) = &result {
            warn!(
                payer = %payer,
                beneficiary = %beneficiary,
                contribution = %contribution,
                code = err.error_code(),
                "Purchase rejected: {err}"
            );
        }
        result
    }

    fn try_purchase(
        &mut self,
        ledger: &mut Ledger,
        payer: AccountId,
        beneficiary: AccountId,
        contribution: Amount,
    ) -> Result<PurchaseReceipt, SaleError> {
        if self.is_finalized() {
            return Err(SaleError::SaleFinalized);
        }
        let state = self.state();
        if state != SaleState::Open {
            return Err(SaleError::SaleNotOpen(state));
        }
        let binding = self.binding.ok_or(SaleError::NotInitialized)?;
        self.ensure_bound_to(binding, ledger)?;

        if contribution < self.config.contribution_min {
            return Err(SaleError::BelowMinimum {
                contribution,
                minimum: self.config.contribution_min,
            });
        }
        if payer == self.wallet {
            return Err(SaleError::InvalidTarget(payer));
        }
        if beneficiary.is_zero()
            || beneficiary == self.address
            || beneficiary == binding.address
            || beneficiary == self.wallet
        {
            return Err(SaleError::InvalidTarget(beneficiary));
        }
        for party in [payer, beneficiary] {
            if !self.is_whitelisted(party) {
                return Err(SaleError::NotWhitelisted(party));
            }
        }

        let pricing = self.pricing(binding.factor);
        let raw_units = pricing.units_for(contribution)?;
        if raw_units.is_zero() {
            return Err(SaleError::InvalidAmount);
        }

        let (units, cost) = self.apply_cap(ledger, beneficiary, raw_units, contribution, &pricing)?;
        let refund = contribution
            .checked_sub(cost)
            .ok_or(SaleError::ArithmeticOverflow)?;
        let units_sold = self
            .total_units_sold
            .checked_add(units)
            .ok_or(SaleError::ArithmeticOverflow)?;
        let collected = self
            .total_contribution
            .checked_add(cost)
            .ok_or(SaleError::ArithmeticOverflow)?;

        ledger.transfer(self.address, beneficiary, units)?;

        self.total_units_sold = units_sold;
        self.total_contribution = collected;
        self.events.push(SaleEvent::TokensPurchased {
            payer,
            beneficiary,
            cost,
            units,
        });

        info!(
            payer = %payer,
            beneficiary = %beneficiary,
            units = %units,
            cost = %cost,
            refund = %refund,
            "Purchase accepted"
        );
        Ok(PurchaseReceipt {
            units,
            cost,
            refund,
        })
    }

    /// Applies the per-account cap, returning the credited units and the
    /// contribution they cost.
    fn apply_cap(
        &self,
        ledger: &Ledger,
        beneficiary: AccountId,
        raw_units: Amount,
        contribution: Amount,
        pricing: &Pricing,
    ) -> Result<(Amount, Amount), SaleError> {
        let cap = self.config.max_units_per_account;
        if cap.is_zero() {
            return Ok((raw_units, contribution));
        }

        let balance = ledger.balance_of(beneficiary);
        if balance >= cap {
            return Err(SaleError::CapReached {
                beneficiary,
                balance,
                cap,
            });
        }

        let remaining = cap - balance;
        if remaining < raw_units {
            let cost = pricing.cost_of(remaining)?.min(contribution);
            Ok((remaining, cost))
        } else {
            Ok((raw_units, contribution))
        }
    }

    // ========== Reclaim ==========

    /// Returns the engine's unsold units to the owner. Owner only.
    ///
    /// Returns `false` without any state change or event when the engine
    /// holds nothing.
    pub fn reclaim_unsold(
        &mut self,
        caller: AccountId,
        ledger: &mut Ledger,
    ) -> Result<bool, SaleError> {
        self.roles.require_owner(caller)?;
        if let Some(binding) = self.binding {
            self.ensure_bound_to(binding, ledger)?;
        }

        let amount = ledger.balance_of(self.address);
        if amount.is_zero() {
            return Ok(false);
        }

        ledger.transfer(self.address, self.roles.owner(), amount)?;
        self.events.push(SaleEvent::TokensReclaimed { amount });

        info!(amount = %amount, owner = %self.roles.owner(), "Unsold units reclaimed");
        Ok(true)
    }

    // ========== Internals ==========

    fn pricing(&self, factor: Amount) -> Pricing {
        Pricing::new(self.config.tokens_per_kether, self.config.bonus_bps, factor)
    }

    fn ensure_not_finalized(&self) -> Result<(), SaleError> {
        if self.is_finalized() {
            return Err(SaleError::SaleFinalized);
        }
        Ok(())
    }

    fn ensure_bound_to(&self, binding: LedgerBinding, ledger: &Ledger) -> Result<(), SaleError> {
        if ledger.address() != binding.address {
            return Err(SaleError::LedgerMismatch {
                expected: binding.address,
                actual: ledger.address(),
            });
        }
        Ok(())
    }

    fn check_whitelist_target(&self, account: AccountId) -> Result<(), SaleError> {
        if account.is_zero() || account == self.address || account == self.wallet {
            return Err(SaleError::InvalidTarget(account));
        }
        Ok(())
    }

    fn set_admission(&mut self, account: AccountId, admitted: bool) {
        if admitted {
            self.whitelist.insert(account);
        } else {
            self.whitelist.remove(&account);
        }
        self.events
            .push(SaleEvent::WhitelistUpdated { account, admitted });
    }

    fn record_role_event(&mut self, event: RoleEvent) {
        info!(sale = %self.address, ?event, "Sale roles updated");
        self.events.push(SaleEvent::Roles(event));
    }
}

fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), SaleError> {
    if start >= end {
        return Err(SaleError::InvalidWindow { start, end });
    }
    Ok(())
}

fn validate_rate(tokens_per_kether: u64) -> Result<(), SaleError> {
    if tokens_per_kether == 0 {
        return Err(SaleError::InvalidAmount);
    }
    Ok(())
}

fn validate_bonus(bonus_bps: u32) -> Result<(), SaleError> {
    if bonus_bps > MAX_BONUS_BPS {
        return Err(SaleError::InvalidAmount);
    }
    Ok(())
}
