//! Property-based tests for the ledger.
//!
//! - Supply integrity: balances always add up to the total supply, and the
//!   supply never grows
//! - Freeze: once frozen, no transfer succeeds for any caller
//! - Finalize: once finalized (and not frozen), holders move their own units

use proptest::prelude::*;

use tally_shared::{AccountId, Amount};

use super::error::LedgerError;
use super::service::Ledger;
use super::types::LedgerConfig;

const SUPPLY: u64 = 1_000_000;

/// Account 0 is the owner, account 1 the operations delegate.
fn account(index: u8) -> AccountId {
    AccountId::from_u128(u128::from(index) + 1)
}

fn fresh_ledger() -> Ledger {
    let config = LedgerConfig {
        name: "Test".to_string(),
        symbol: "TST".to_string(),
        decimals: 0,
        initial_supply: Amount::from(SUPPLY),
    };
    let mut ledger =
        Ledger::with_address(config, account(0), AccountId::from_u128(999)).unwrap();
    ledger.set_operations(account(0), account(1)).unwrap();
    ledger
}

#[derive(Debug, Clone)]
enum Op {
    Transfer { from: u8, to: u8, amount: u64 },
    Burn { who: u8, amount: u64 },
    Approve { owner: u8, spender: u8, amount: u64 },
    TransferFrom { spender: u8, from: u8, to: u8, amount: u64 },
    Finalize,
    Freeze,
    Reclaim,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let who = 0u8..6;
    let amount = 0u64..SUPPLY / 2;
    prop_oneof![
        6 => (who.clone(), who.clone(), amount.clone())
            .prop_map(|(from, to, amount)| Op::Transfer { from, to, amount }),
        2 => (who.clone(), amount.clone()).prop_map(|(who, amount)| Op::Burn { who, amount }),
        2 => (who.clone(), who.clone(), amount.clone())
            .prop_map(|(owner, spender, amount)| Op::Approve { owner, spender, amount }),
        2 => (who.clone(), who.clone(), who, amount)
            .prop_map(|(spender, from, to, amount)| Op::TransferFrom { spender, from, to, amount }),
        1 => Just(Op::Finalize),
        1 => Just(Op::Freeze),
        1 => Just(Op::Reclaim),
    ]
}

fn apply(ledger: &mut Ledger, op: &Op) -> Result<(), LedgerError> {
    match *op {
        Op::Transfer { from, to, amount } => {
            ledger.transfer(account(from), account(to), Amount::from(amount))
        }
        Op::Burn { who, amount } => ledger.burn(account(who), Amount::from(amount)),
        Op::Approve {
            owner,
            spender,
            amount,
        } => ledger.approve(account(owner), account(spender), Amount::from(amount)),
        Op::TransferFrom {
            spender,
            from,
            to,
            amount,
        } => ledger.transfer_from(
            account(spender),
            account(from),
            account(to),
            Amount::from(amount),
        ),
        Op::Finalize => ledger.finalize(account(0)),
        Op::Freeze => ledger.freeze(account(0)),
        Op::Reclaim => ledger.reclaim(account(0)).map(|_| ()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// For any sequence of operations, successful or not, the balances add
    /// up to the total supply and the supply never increases.
    #[test]
    fn prop_supply_integrity(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut ledger = fresh_ledger();
        let mut last_supply = ledger.total_supply();

        for op in &ops {
            let events_before = ledger.events().len();
            let snapshot_before = ledger.snapshot();
            let result = apply(&mut ledger, op);

            if result.is_err() {
                prop_assert_eq!(ledger.events().len(), events_before);
                prop_assert_eq!(&ledger.snapshot(), &snapshot_before);
            }
            prop_assert!(ledger.circulating_check());
            prop_assert!(ledger.total_supply() <= last_supply);
            last_supply = ledger.total_supply();
        }
    }

    /// Once frozen, every transfer fails with `TransfersHalted`.
    #[test]
    fn prop_frozen_halts_every_transfer(
        finalize_first in any::<bool>(),
        from in 0u8..6,
        to in 0u8..6,
        amount in 0u64..SUPPLY,
    ) {
        let mut ledger = fresh_ledger();
        ledger.transfer(account(0), account(from), Amount::from(amount)).unwrap();
        if finalize_first {
            ledger.finalize(account(0)).unwrap();
        }
        ledger.freeze(account(0)).unwrap();

        prop_assert_eq!(
            ledger.transfer(account(from), account(to), Amount::from(amount)),
            Err(LedgerError::TransfersHalted)
        );
    }

    /// Once finalized and not frozen, any holder can move its own units.
    #[test]
    fn prop_finalized_holders_transfer_freely(
        holder in 2u8..6,
        to in 0u8..6,
        funded in 1u64..SUPPLY,
        fraction in 0u64..=100,
    ) {
        let mut ledger = fresh_ledger();
        ledger.transfer(account(0), account(holder), Amount::from(funded)).unwrap();
        ledger.finalize(account(0)).unwrap();

        let amount = Amount::from(funded * fraction / 100);
        prop_assert!(ledger.transfer(account(holder), account(to), amount).is_ok());
        prop_assert!(ledger.circulating_check());
    }
}
