//! The ledger: balances, allowances, supply and the transfer gate.
//!
//! Transfer gating, strongest rule first:
//! 1. once frozen, nobody moves units;
//! 2. before finalization only the owner and the operations delegate move
//!    units;
//! 3. after finalization every account moves its own units.

use std::collections::BTreeMap;

use tracing::{debug, info};

use tally_shared::{AccountId, Amount};

use super::error::LedgerError;
use super::types::{Holding, LedgerConfig, LedgerEvent, LedgerSnapshot};
use crate::events::EventLog;
use crate::latch::Latch;
use crate::roles::{RoleEvent, Roles};

/// Fungible unit ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
    address: AccountId,
    name: String,
    symbol: String,
    decimals: u32,
    total_supply: Amount,
    balances: BTreeMap<AccountId, Amount>,
    allowances: BTreeMap<(AccountId, AccountId), Amount>,
    roles: Roles,
    frozen: Latch,
    finalized: Latch,
    events: EventLog<LedgerEvent>,
}

impl Ledger {
    /// Creates a ledger at a fresh address and mints the whole supply to
    /// `owner`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTarget` if `owner` is the null identifier.
    pub fn new(config: LedgerConfig, owner: AccountId) -> Result<Self, LedgerError> {
        Self::with_address(config, owner, AccountId::new())
    }

    /// Creates a ledger at a given address.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTarget` if `owner` or `address` is the null
    /// identifier, or if they coincide.
    pub fn with_address(
        config: LedgerConfig,
        owner: AccountId,
        address: AccountId,
    ) -> Result<Self, LedgerError> {
        let roles = Roles::new(owner)?;
        if address.is_zero() || address == owner {
            return Err(LedgerError::InvalidTarget(address));
        }

        let mut ledger = Self {
            address,
            name: config.name,
            symbol: config.symbol,
            decimals: config.decimals,
            total_supply: config.initial_supply,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            roles,
            frozen: Latch::new(),
            finalized: Latch::new(),
            events: EventLog::new(),
        };
        ledger.set_balance(owner, config.initial_supply);
        ledger.events.push(LedgerEvent::Transfer {
            from: AccountId::ZERO,
            to: owner,
            amount: config.initial_supply,
        });

        info!(
            ledger = %address,
            owner = %owner,
            supply = %config.initial_supply,
            "Ledger created"
        );
        Ok(ledger)
    }

    // ========== Read model ==========

    /// Ledger's own address.
    #[must_use]
    pub const fn address(&self) -> AccountId {
        self.address
    }

    /// Name of the unit.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ticker symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Decimals of one whole unit.
    #[must_use]
    pub const fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Current total supply.
    #[must_use]
    pub const fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Balance of `account` (zero when absent).
    #[must_use]
    pub fn balance_of(&self, account: AccountId) -> Amount {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    /// Amount `spender` may still move out of `owner`'s balance.
    #[must_use]
    pub fn allowance(&self, owner: AccountId, spender: AccountId) -> Amount {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    /// Whether transfers are halted.
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.frozen.is_engaged()
    }

    /// Whether transfer gating is lifted.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized.is_engaged()
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

    /// Emitted events.
    #[must_use]
    pub const fn events(&self) -> &EventLog<LedgerEvent> {
        &self.events
    }

    /// Non-zero balances, ordered by account.
    pub fn holders(&self) -> impl Iterator<Item = (AccountId, Amount)> + '_ {
        self.balances.iter().map(|(account, balance)| (*account, *balance))
    }

    /// Audits the ledger: true when the balances add up to the total supply.
    #[must_use]
    pub fn circulating_check(&self) -> bool {
        self.balances
            .values()
            .try_fold(Amount::zero(), |acc, balance| acc.checked_add(*balance))
            == Some(self.total_supply)
    }

    /// Serializable view of the current state.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            address: self.address,
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            total_supply: self.total_supply,
            owner: self.roles.owner(),
            operations: self.roles.operations(),
            frozen: self.is_frozen(),
            finalized: self.is_finalized(),
            balances: self
                .holders()
                .map(|(account, balance)| Holding { account, balance })
                .collect(),
        }
    }

    // ========== Transfers ==========

    /// Moves `amount` from `caller` to `to`.
    ///
    /// # Errors
    ///
    /// - `TransfersHalted` once frozen, whoever the caller is
    /// - `Unauthorized` before finalization unless the caller is the owner
    ///   or the operations delegate
    /// - `InvalidTarget` if `to` is the null identifier
    /// - `InsufficientBalance` if the caller holds less than `amount`
    pub fn transfer(
        &mut self,
        caller: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.check_transfer_gate(caller)?;
        self.move_units(caller, to, amount)
    }

    /// Sets the amount `spender` may move out of `owner`'s balance.
    pub fn approve(
        &mut self,
        owner: AccountId,
        spender: AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if spender.is_zero() {
            return Err(LedgerError::InvalidTarget(spender));
        }
        if amount.is_zero() {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
        self.events.push(LedgerEvent::Approval {
            owner,
            spender,
            amount,
        });
        debug!(owner = %owner, spender = %spender, amount = %amount, "Allowance set");
        Ok(())
    }

    /// Moves `amount` from `from` to `to` on behalf of `spender`, consuming
    /// allowance.
    ///
    /// The transfer gate is evaluated against the spender.
    pub fn transfer_from(
        &mut self,
        spender: AccountId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.check_transfer_gate(spender)?;

        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: from,
                spender,
                allowance,
                required: amount,
            });
        }

        self.move_units(from, to, amount)?;

        let remaining = allowance - amount;
        if remaining.is_zero() {
            self.allowances.remove(&(from, spender));
        } else {
            self.allowances.insert((from, spender), remaining);
        }
        Ok(())
    }

    /// Destroys `amount` of the caller's own units.
    ///
    /// Burning is not gated by `frozen`: freezing halts movement between
    /// accounts, burning only shrinks the caller's balance and the supply
    /// together.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if `amount` is zero
    /// - `InsufficientBalance` if the caller holds less than `amount`
    pub fn burn(&mut self, caller: AccountId, amount: Amount) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }
        let balance = self.balance_of(caller);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account: caller,
                balance,
                required: amount,
            });
        }

        self.set_balance(caller, balance - amount);
        self.total_supply = self
            .total_supply
            .checked_sub(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.events.push(LedgerEvent::Burn {
            burner: caller,
            amount,
        });

        info!(burner = %caller, amount = %amount, supply = %self.total_supply, "Units burned");
        Ok(())
    }

    // ========== Lifecycle ==========

    /// Halts every transfer for good. Owner only.
    pub fn freeze(&mut self, caller: AccountId) -> Result<(), LedgerError> {
        self.roles.require_owner(caller)?;
        if !self.frozen.engage() {
            return Err(LedgerError::AlreadyFrozen);
        }
        self.events.push(LedgerEvent::Frozen);
        info!(ledger = %self.address, "Ledger frozen");
        Ok(())
    }

    /// Lifts transfer gating for good. Owner only.
    pub fn finalize(&mut self, caller: AccountId) -> Result<(), LedgerError> {
        self.roles.require_owner(caller)?;
        if !self.finalized.engage() {
            return Err(LedgerError::AlreadyFinalized);
        }
        self.events.push(LedgerEvent::Finalized);
        info!(ledger = %self.address, "Ledger finalized");
        Ok(())
    }

    /// Returns units held at the ledger's own address to the owner.
    ///
    /// Returns `false` without any state change or event when there is
    /// nothing to reclaim. Works while frozen.
    pub fn reclaim(&mut self, caller: AccountId) -> Result<bool, LedgerError> {
        self.roles.require_owner(caller)?;

        let amount = self.balance_of(self.address);
        if amount.is_zero() {
            return Ok(false);
        }

        let owner = self.roles.owner();
        let credited = self
            .balance_of(owner)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.set_balance(self.address, Amount::zero());
        self.set_balance(owner, credited);

        self.events.push(LedgerEvent::Transfer {
            from: self.address,
            to: owner,
            amount,
        });
        self.events.push(LedgerEvent::Reclaimed { amount });

        info!(amount = %amount, owner = %owner, "Ledger balance reclaimed");
        Ok(true)
    }

    // ========== Roles ==========

    /// Replaces the operations delegate. Owner only.
    pub fn set_operations(
        &mut self,
        caller: AccountId,
        operations: AccountId,
    ) -> Result<(), LedgerError> {
        if operations == self.address {
            return Err(LedgerError::InvalidTarget(operations));
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
    ) -> Result<(), LedgerError> {
        if proposed == self.address {
            return Err(LedgerError::InvalidTarget(proposed));
        }
        let event = self.roles.propose_owner(caller, proposed)?;
        self.record_role_event(event);
        Ok(())
    }

    /// Accepts a pending ownership proposal.
    pub fn accept_ownership(&mut self, caller: AccountId) -> Result<(), LedgerError> {
        let event = self.roles.accept_ownership(caller)?;
        self.record_role_event(event);
        Ok(())
    }

    // ========== Internals ==========

    fn check_transfer_gate(&self, caller: AccountId) -> Result<(), LedgerError> {
        if self.is_frozen() {
            return Err(LedgerError::TransfersHalted);
        }
        if !self.is_finalized() && !self.roles.is_owner_or_operations(caller) {
            return Err(LedgerError::Unauthorized(caller));
        }
        Ok(())
    }

    fn move_units(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::InvalidTarget(to));
        }
        let from_balance = self.balance_of(from);
        if from_balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account: from,
                balance: from_balance,
                required: amount,
            });
        }

        if from != to {
            let to_balance = self
                .balance_of(to)
                .checked_add(amount)
                .ok_or(LedgerError::ArithmeticOverflow)?;
            self.set_balance(from, from_balance - amount);
            self.set_balance(to, to_balance);
        }

        self.events.push(LedgerEvent::Transfer { from, to, amount });
        debug!(from = %from, to = %to, amount = %amount, "Units transferred");
        Ok(())
    }

    fn set_balance(&mut self, account: AccountId, balance: Amount) {
        if balance.is_zero() {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, balance);
        }
    }

    fn record_role_event(&mut self, event: RoleEvent) {
        info!(ledger = %self.address, ?event, "Ledger roles updated");
        self.events.push(LedgerEvent::Roles(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_shared::types::amount::scale_units;

    const OWNER: AccountId = AccountId::from_u128(1);
    const OPS: AccountId = AccountId::from_u128(2);
    const ALICE: AccountId = AccountId::from_u128(10);
    const BOB: AccountId = AccountId::from_u128(11);
    const LEDGER: AccountId = AccountId::from_u128(100);

    fn units(n: u64) -> Amount {
        Amount::from(n)
    }

    fn ledger() -> Ledger {
        let mut ledger = Ledger::with_address(LedgerConfig::default(), OWNER, LEDGER).unwrap();
        ledger.set_operations(OWNER, OPS).unwrap();
        ledger
    }

    #[test]
    fn test_creation_mints_supply_to_owner() {
        let ledger = ledger();
        let supply = scale_units(150_000_000, 18).unwrap();
        assert_eq!(ledger.total_supply(), supply);
        assert_eq!(ledger.balance_of(OWNER), supply);
        assert_eq!(
            ledger.events().as_slice()[0],
            LedgerEvent::Transfer {
                from: AccountId::ZERO,
                to: OWNER,
                amount: supply,
            }
        );
        assert!(ledger.circulating_check());
    }

    #[test]
    fn test_creation_rejects_bad_addresses() {
        assert_eq!(
            Ledger::with_address(LedgerConfig::default(), AccountId::ZERO, LEDGER).unwrap_err(),
            LedgerError::InvalidTarget(AccountId::ZERO)
        );
        assert_eq!(
            Ledger::with_address(LedgerConfig::default(), OWNER, OWNER).unwrap_err(),
            LedgerError::InvalidTarget(OWNER)
        );
    }

    #[test]
    fn test_transfer_gated_before_finalize() {
        let mut ledger = ledger();
        ledger.transfer(OWNER, ALICE, units(500)).unwrap();
        ledger.transfer(OWNER, OPS, units(500)).unwrap();
        ledger.transfer(OPS, BOB, units(100)).unwrap();

        assert_eq!(
            ledger.transfer(ALICE, BOB, units(1)),
            Err(LedgerError::Unauthorized(ALICE))
        );
        assert_eq!(ledger.balance_of(BOB), units(100));
    }

    #[test]
    fn test_transfer_open_after_finalize() {
        let mut ledger = ledger();
        ledger.transfer(OWNER, ALICE, units(500)).unwrap();
        ledger.finalize(OWNER).unwrap();

        ledger.transfer(ALICE, BOB, units(200)).unwrap();
        assert_eq!(ledger.balance_of(ALICE), units(300));
        assert_eq!(ledger.balance_of(BOB), units(200));
        assert!(ledger.circulating_check());
    }

    #[test]
    fn test_frozen_halts_everyone() {
        let mut ledger = ledger();
        ledger.transfer(OWNER, ALICE, units(500)).unwrap();
        ledger.finalize(OWNER).unwrap();
        ledger.freeze(OWNER).unwrap();

        assert_eq!(
            ledger.transfer(OWNER, ALICE, units(1)),
            Err(LedgerError::TransfersHalted)
        );
        assert_eq!(
            ledger.transfer(OPS, ALICE, units(1)),
            Err(LedgerError::TransfersHalted)
        );
        assert_eq!(
            ledger.transfer(ALICE, BOB, units(1)),
            Err(LedgerError::TransfersHalted)
        );
    }

    #[test]
    fn test_frozen_wins_over_insufficient_balance() {
        let mut ledger = ledger();
        ledger.freeze(OWNER).unwrap();
        assert_eq!(
            ledger.transfer(ALICE, BOB, units(1)),
            Err(LedgerError::TransfersHalted)
        );
    }

    #[test]
    fn test_transfer_rejections() {
        let mut ledger = ledger();
        let supply = ledger.total_supply();
        assert_eq!(
            ledger.transfer(OWNER, AccountId::ZERO, units(1)),
            Err(LedgerError::InvalidTarget(AccountId::ZERO))
        );
        assert_eq!(
            ledger.transfer(OWNER, ALICE, supply + units(1)),
            Err(LedgerError::InsufficientBalance {
                account: OWNER,
                balance: supply,
                required: supply + units(1),
            })
        );
        assert_eq!(ledger.events().len(), 2);
    }

    #[test]
    fn test_zero_and_self_transfers() {
        let mut ledger = ledger();
        let before = ledger.balance_of(OWNER);
        ledger.transfer(OWNER, ALICE, Amount::zero()).unwrap();
        ledger.transfer(OWNER, OWNER, units(10)).unwrap();
        assert_eq!(ledger.balance_of(OWNER), before);
        assert_eq!(ledger.balance_of(ALICE), Amount::zero());
        assert!(ledger.circulating_check());
    }

    #[test]
    fn test_freeze_and_finalize_are_owner_only_and_once() {
        let mut ledger = ledger();
        assert_eq!(ledger.freeze(OPS), Err(LedgerError::Unauthorized(OPS)));
        assert_eq!(ledger.finalize(ALICE), Err(LedgerError::Unauthorized(ALICE)));

        ledger.freeze(OWNER).unwrap();
        assert_eq!(ledger.freeze(OWNER), Err(LedgerError::AlreadyFrozen));

        ledger.finalize(OWNER).unwrap();
        assert_eq!(ledger.finalize(OWNER), Err(LedgerError::AlreadyFinalized));
        assert!(ledger.is_frozen());
        assert!(ledger.is_finalized());
    }

    #[test]
    fn test_burn_all_but_one_thousand() {
        let mut ledger = ledger();
        let supply = ledger.total_supply();
        let burned = supply - units(1000);

        ledger.burn(OWNER, burned).unwrap();

        assert_eq!(ledger.balance_of(OWNER), units(1000));
        assert_eq!(ledger.total_supply(), units(1000));
        assert_eq!(
            ledger.events().last(),
            Some(&LedgerEvent::Burn {
                burner: OWNER,
                amount: burned,
            })
        );
        assert!(ledger.circulating_check());
    }

    #[test]
    fn test_burn_rejections() {
        let mut ledger = ledger();
        assert_eq!(ledger.burn(OWNER, Amount::zero()), Err(LedgerError::InvalidAmount));
        assert_eq!(
            ledger.burn(ALICE, units(1)),
            Err(LedgerError::InsufficientBalance {
                account: ALICE,
                balance: Amount::zero(),
                required: units(1),
            })
        );
    }

    #[test]
    fn test_burn_allowed_while_frozen() {
        let mut ledger = ledger();
        ledger.transfer(OWNER, ALICE, units(50)).unwrap();
        ledger.freeze(OWNER).unwrap();
        let supply = ledger.total_supply();

        ledger.burn(ALICE, units(20)).unwrap();

        assert_eq!(ledger.balance_of(ALICE), units(30));
        assert_eq!(ledger.total_supply(), supply - units(20));
        assert!(ledger.circulating_check());
    }

    #[test]
    fn test_reclaim() {
        let mut ledger = ledger();
        let events_before = ledger.events().len();
        assert_eq!(ledger.reclaim(OWNER), Ok(false));
        assert_eq!(ledger.events().len(), events_before);

        ledger.transfer(OWNER, LEDGER, units(1000)).unwrap();
        let owner_before = ledger.balance_of(OWNER);
        assert_eq!(ledger.reclaim(OPS), Err(LedgerError::Unauthorized(OPS)));
        assert_eq!(ledger.reclaim(OWNER), Ok(true));

        assert_eq!(ledger.balance_of(LEDGER), Amount::zero());
        assert_eq!(ledger.balance_of(OWNER), owner_before + units(1000));
        let tail = ledger.events().since(ledger.events().len() - 2);
        assert_eq!(
            tail,
            &[
                LedgerEvent::Transfer {
                    from: LEDGER,
                    to: OWNER,
                    amount: units(1000),
                },
                LedgerEvent::Reclaimed {
                    amount: units(1000)
                },
            ]
        );
    }

    #[test]
    fn test_reclaim_works_while_frozen() {
        let mut ledger = ledger();
        ledger.transfer(OWNER, LEDGER, units(7)).unwrap();
        ledger.freeze(OWNER).unwrap();
        assert_eq!(ledger.reclaim(OWNER), Ok(true));
        assert_eq!(ledger.balance_of(LEDGER), Amount::zero());
    }

    #[test]
    fn test_allowance_flow() {
        let mut ledger = ledger();
        ledger.transfer(OWNER, ALICE, units(100)).unwrap();
        ledger.finalize(OWNER).unwrap();

        ledger.approve(ALICE, BOB, units(60)).unwrap();
        assert_eq!(ledger.allowance(ALICE, BOB), units(60));

        ledger.transfer_from(BOB, ALICE, BOB, units(40)).unwrap();
        assert_eq!(ledger.allowance(ALICE, BOB), units(20));
        assert_eq!(ledger.balance_of(BOB), units(40));

        assert_eq!(
            ledger.transfer_from(BOB, ALICE, BOB, units(21)),
            Err(LedgerError::InsufficientAllowance {
                owner: ALICE,
                spender: BOB,
                allowance: units(20),
                required: units(21),
            })
        );
        assert_eq!(
            ledger.approve(ALICE, AccountId::ZERO, units(1)),
            Err(LedgerError::InvalidTarget(AccountId::ZERO))
        );
    }

    #[test]
    fn test_transfer_from_gated_by_spender() {
        let mut ledger = ledger();
        ledger.approve(OWNER, ALICE, units(10)).unwrap();
        assert_eq!(
            ledger.transfer_from(ALICE, OWNER, BOB, units(5)),
            Err(LedgerError::Unauthorized(ALICE))
        );

        ledger.approve(OWNER, OPS, units(10)).unwrap();
        ledger.transfer_from(OPS, OWNER, BOB, units(5)).unwrap();
        assert_eq!(ledger.balance_of(BOB), units(5));
        assert_eq!(ledger.allowance(OWNER, OPS), units(5));
    }

    #[test]
    fn test_transfer_from_failure_keeps_allowance() {
        let mut ledger = ledger();
        ledger.finalize(OWNER).unwrap();
        ledger.approve(ALICE, BOB, units(10)).unwrap();
        assert!(ledger.transfer_from(BOB, ALICE, BOB, units(5)).is_err());
        assert_eq!(ledger.allowance(ALICE, BOB), units(10));
    }

    #[test]
    fn test_role_changes_are_logged() {
        let mut ledger = ledger();
        assert_eq!(
            ledger.set_operations(OWNER, LEDGER),
            Err(LedgerError::InvalidTarget(LEDGER))
        );
        ledger.propose_owner(OWNER, ALICE).unwrap();
        ledger.accept_ownership(ALICE).unwrap();
        assert_eq!(ledger.owner(), ALICE);
        assert_eq!(
            ledger.events().last(),
            Some(&LedgerEvent::Roles(RoleEvent::OwnershipTransferCompleted {
                owner: ALICE
            }))
        );
        assert_eq!(ledger.freeze(OWNER), Err(LedgerError::Unauthorized(OWNER)));
    }

    #[test]
    fn test_snapshot_lists_holders() {
        let mut ledger = ledger();
        ledger.transfer(OWNER, ALICE, units(3)).unwrap();
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.balances.len(), 2);
        assert_eq!(snapshot.operations, Some(OPS));
        assert!(!snapshot.frozen);
    }
}
