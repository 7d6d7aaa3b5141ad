//! Property-based tests for the sale engine.
//!
//! - Cap correctness: a beneficiary at the cap is rejected, one below it
//!   ends at exactly the cap or gains exactly the raw units
//! - Rate conversion: credited units follow the integer formula
//! - Accounting: running totals equal the sum of receipts and the engine's
//!   stock shrinks by exactly what it sold

use std::sync::Arc;

use chrono::Duration;
use proptest::prelude::*;

use tally_shared::types::amount::scale_units;
use tally_shared::{AccountId, Amount};

use super::engine::SaleEngine;
use super::error::SaleError;
use super::types::SaleConfig;
use crate::clock::ManualClock;
use crate::ledger::{Ledger, LedgerConfig};

const OWNER: AccountId = AccountId::from_u128(1);
const WALLET: AccountId = AccountId::from_u128(3);
const BUYER: AccountId = AccountId::from_u128(10);
const LEDGER: AccountId = AccountId::from_u128(100);
const SALE: AccountId = AccountId::from_u128(200);

const TENTH: u64 = 100_000_000_000_000_000;
const STOCK_WHOLE: u64 = 1_000_000;

fn setup(config: SaleConfig) -> (Ledger, SaleEngine) {
    let clock = Arc::new(ManualClock::new(config.start_time + Duration::seconds(1)));
    let mut ledger = Ledger::with_address(LedgerConfig::default(), OWNER, LEDGER).unwrap();
    let mut sale = SaleEngine::with_address(config, OWNER, WALLET, clock, SALE).unwrap();
    ledger.set_operations(OWNER, SALE).unwrap();
    ledger
        .transfer(OWNER, SALE, scale_units(STOCK_WHOLE, 18).unwrap())
        .unwrap();
    sale.initialize(OWNER, &ledger).unwrap();
    sale.update_whitelist(OWNER, BUYER, true).unwrap();
    (ledger, sale)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Given cap C, existing balance B and raw units U:
    /// B >= C fails with `CapReached`, B < C <= B + U ends at exactly C,
    /// B + U < C gains exactly U.
    #[test]
    fn prop_cap_correctness(
        cap in 1u64..6_000_000_000_000_000_000,
        existing in 0u64..6_000_000_000_000_000_000,
        tenths in 1u64..5,
    ) {
        let (mut ledger, mut sale) = setup(SaleConfig::default());
        sale.set_max_units_per_account(OWNER, Amount::from(cap)).unwrap();
        if existing > 0 {
            ledger.transfer(OWNER, BUYER, Amount::from(existing)).unwrap();
        }

        let contribution = Amount::from(TENTH) * Amount::from(tenths);
        let raw = sale.quote(contribution).unwrap();
        let cap = Amount::from(cap);
        let existing = Amount::from(existing);

        let result = sale.purchase(&mut ledger, BUYER, BUYER, contribution);

        if existing >= cap {
            prop_assert_eq!(
                result,
                Err(SaleError::CapReached { beneficiary: BUYER, balance: existing, cap })
            );
            prop_assert_eq!(ledger.balance_of(BUYER), existing);
        } else if cap <= existing + raw {
            let receipt = result.unwrap();
            prop_assert_eq!(ledger.balance_of(BUYER), cap);
            prop_assert_eq!(receipt.units, cap - existing);
            prop_assert!(receipt.cost <= contribution);
            prop_assert_eq!(receipt.cost + receipt.refund, contribution);
        } else {
            let receipt = result.unwrap();
            prop_assert_eq!(ledger.balance_of(BUYER), existing + raw);
            prop_assert_eq!(receipt.units, raw);
            prop_assert_eq!(receipt.refund, Amount::zero());
        }
        prop_assert!(ledger.circulating_check());
    }

    /// Credited units equal contribution × rate × (10,000 + bonus) ÷ 10^7
    /// for an 18-decimal ledger.
    #[test]
    fn prop_rate_conversion(
        contribution in u128::from(TENTH)..100_000_000_000_000_000_000u128,
        tokens_per_kether in 1u64..100_000,
        bonus_bps in 0u32..=10_000,
    ) {
        let config = SaleConfig {
            tokens_per_kether,
            bonus_bps,
            ..SaleConfig::default()
        };
        let (mut ledger, mut sale) = setup(config);

        let expected = contribution
            * u128::from(tokens_per_kether)
            * (10_000 + u128::from(bonus_bps))
            / 10_000_000;
        let result = sale.purchase(&mut ledger, BUYER, BUYER, Amount::from(contribution));

        if expected == 0 {
            prop_assert_eq!(result, Err(SaleError::InvalidAmount));
        } else {
            let receipt = result.unwrap();
            prop_assert_eq!(receipt.units, Amount::from(expected));
            prop_assert_eq!(receipt.cost, Amount::from(contribution));
            prop_assert_eq!(ledger.balance_of(BUYER), Amount::from(expected));
        }
    }

    /// Running totals track receipts and the engine's stock shrinks by
    /// exactly what was sold.
    #[test]
    fn prop_totals_follow_receipts(
        purchases in prop::collection::vec(1u64..50, 1..20),
        cap_whole in 0u64..20,
    ) {
        let (mut ledger, mut sale) = setup(SaleConfig::default());
        sale.set_max_units_per_account(OWNER, scale_units(cap_whole, 18).unwrap()).unwrap();
        let stock = ledger.balance_of(SALE);

        let mut units = Amount::zero();
        let mut cost = Amount::zero();
        for tenths in purchases {
            let contribution = Amount::from(TENTH) * Amount::from(tenths);
            if let Ok(receipt) = sale.purchase(&mut ledger, BUYER, BUYER, contribution) {
                units += receipt.units;
                cost += receipt.cost;
            }
        }

        prop_assert_eq!(sale.total_units_sold(), units);
        prop_assert_eq!(sale.total_contribution(), cost);
        prop_assert_eq!(ledger.balance_of(SALE) + units, stock);
        prop_assert!(ledger.circulating_check());
    }
}
