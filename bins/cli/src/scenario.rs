//! Scripted scenarios against a fresh deployment.
//!
//! A scenario is a JSON document with an optional start time and a list of
//! steps. Each step names an operation (`"op"`) and the actors involved by
//! name. Reserved names map to the deployment's fixed roles; any other name
//! is given a stable identifier the first time it appears.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use tally_core::clock::ManualClock;
use tally_core::deployment::{Deployment, DeploymentPlan};
use tally_core::ledger::LedgerEvent;
use tally_core::sale::SaleEvent;
use tally_shared::types::amount::dec_str;
use tally_shared::{AccountId, Amount, AppConfig, AppError, AppResult};

/// Owner of both components.
pub const OWNER: AccountId = AccountId::from_u128(1);
/// Operations delegate of the sale engine.
pub const OPERATIONS: AccountId = AccountId::from_u128(2);
/// Settlement wallet.
pub const WALLET: AccountId = AccountId::from_u128(3);

const FIRST_NAMED_ACCOUNT: u128 = 1_000;

/// A scripted scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Initial clock time; defaults to the configured sale start.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Steps, run in order.
    pub steps: Vec<Step>,
}

/// One scenario step.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Operation to run.
    #[serde(flatten)]
    pub action: Action,
    /// Error code the step must fail with.
    #[serde(default)]
    pub expect_error: Option<String>,
}

/// Operations a step can run.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Action {
    SetTime {
        at: DateTime<Utc>,
    },
    Advance {
        seconds: i64,
    },
    Transfer {
        caller: String,
        to: String,
        #[serde(with = "dec_str")]
        amount: Amount,
    },
    Approve {
        caller: String,
        spender: String,
        #[serde(with = "dec_str")]
        amount: Amount,
    },
    TransferFrom {
        caller: String,
        from: String,
        to: String,
        #[serde(with = "dec_str")]
        amount: Amount,
    },
    Burn {
        caller: String,
        #[serde(with = "dec_str")]
        amount: Amount,
    },
    Freeze {
        caller: String,
    },
    FinalizeLedger {
        caller: String,
    },
    ReclaimLedger {
        caller: String,
    },
    Whitelist {
        caller: String,
        accounts: Vec<String>,
        admitted: bool,
    },
    Purchase {
        payer: String,
        #[serde(default)]
        beneficiary: Option<String>,
        #[serde(with = "dec_str")]
        contribution: Amount,
    },
    SetSaleWindow {
        caller: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
    SetBonus {
        caller: String,
        bonus_bps: u32,
    },
    SetTokensPerKether {
        caller: String,
        tokens_per_kether: u64,
    },
    SetMaxUnitsPerAccount {
        caller: String,
        #[serde(with = "dec_str")]
        amount: Amount,
    },
    SetWalletAddress {
        caller: String,
        wallet: String,
    },
    Suspend {
        caller: String,
    },
    Resume {
        caller: String,
    },
    FinalizeSale {
        caller: String,
    },
    Reclaim {
        caller: String,
    },
}

impl Action {
    /// Operation name as written in scenario files.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetTime { .. } => "set_time",
            Self::Advance { .. } => "advance",
            Self::Transfer { .. } => "transfer",
            Self::Approve { .. } => "approve",
            Self::TransferFrom { .. } => "transfer_from",
            Self::Burn { .. } => "burn",
            Self::Freeze { .. } => "freeze",
            Self::FinalizeLedger { .. } => "finalize_ledger",
            Self::ReclaimLedger { .. } => "reclaim_ledger",
            Self::Whitelist { .. } => "whitelist",
            Self::Purchase { .. } => "purchase",
            Self::SetSaleWindow { .. } => "set_sale_window",
            Self::SetBonus { .. } => "set_bonus",
            Self::SetTokensPerKether { .. } => "set_tokens_per_kether",
            Self::SetMaxUnitsPerAccount { .. } => "set_max_units_per_account",
            Self::SetWalletAddress { .. } => "set_wallet_address",
            Self::Suspend { .. } => "suspend",
            Self::Resume { .. } => "resume",
            Self::FinalizeSale { .. } => "finalize_sale",
            Self::Reclaim { .. } => "reclaim",
        }
    }
}

/// Maps actor names to account identifiers.
#[derive(Debug, Clone)]
pub struct Actors {
    ledger: AccountId,
    sale: AccountId,
    named: BTreeMap<String, AccountId>,
}

impl Actors {
    /// Creates the table for a deployment.
    #[must_use]
    pub fn new(ledger: AccountId, sale: AccountId) -> Self {
        Self {
            ledger,
            sale,
            named: BTreeMap::new(),
        }
    }

    /// Resolves a name: reserved role names first, then literal UUIDs, then
    /// named actors (allocated on first use).
    pub fn resolve(&mut self, name: &str) -> AccountId {
        match name {
            "owner" => OWNER,
            "ops" => OPERATIONS,
            "wallet" => WALLET,
            "sale" => self.sale,
            "ledger" => self.ledger,
            "zero" => AccountId::ZERO,
            other => {
                if let Ok(id) = other.parse() {
                    return id;
                }
                let next = FIRST_NAMED_ACCOUNT + self.named.len() as u128;
                *self
                    .named
                    .entry(other.to_string())
                    .or_insert_with(|| AccountId::from_u128(next))
            }
        }
    }

    /// Every name worth reporting, with its account.
    pub fn all(&self) -> impl Iterator<Item = (&str, AccountId)> + '_ {
        [
            ("owner", OWNER),
            ("ops", OPERATIONS),
            ("wallet", WALLET),
            ("sale", self.sale),
            ("ledger", self.ledger),
        ]
        .into_iter()
        .chain(self.named.iter().map(|(name, id)| (name.as_str(), *id)))
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step succeeded as expected.
    Ok,
    /// Step failed with the expected code.
    Rejected,
    /// Step failed although success was expected.
    UnexpectedRejection,
    /// Step succeeded although a failure was expected.
    UnexpectedSuccess,
}

/// Report line for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    /// Position in the scenario (zero-based).
    pub index: usize,
    /// Operation name.
    pub op: &'static str,
    /// Outcome.
    pub status: StepStatus,
    /// Error code, if the step failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    /// Error message, if the step failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of a scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// True when every step behaved as expected.
    pub completed: bool,
    /// Per-step outcomes, up to the first unexpected one.
    pub steps: Vec<StepOutcome>,
    /// Balances of every known actor, as decimal strings.
    pub balances: BTreeMap<String, String>,
    /// Ledger event log.
    pub ledger_events: Vec<LedgerEvent>,
    /// Sale engine event log.
    pub sale_events: Vec<SaleEvent>,
}

impl ScenarioReport {
    /// The step that stopped the run, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&StepOutcome> {
        self.steps.iter().find(|step| {
            matches!(
                step.status,
                StepStatus::UnexpectedRejection | StepStatus::UnexpectedSuccess
            )
        })
    }
}

/// Runs scenarios against one deployment.
#[derive(Debug)]
pub struct ScenarioRunner {
    deployment: Deployment,
    clock: Arc<ManualClock>,
    actors: Actors,
}

impl ScenarioRunner {
    /// Launches a deployment from `config` with the clock at `start`
    /// (or the configured sale start).
    pub fn launch(config: &AppConfig, start: Option<DateTime<Utc>>) -> AppResult<Self> {
        let plan = DeploymentPlan::from_config(config, OWNER, OPERATIONS, WALLET)?;
        let clock = Arc::new(ManualClock::new(start.unwrap_or(config.sale.start_time)));
        let deployment = Deployment::launch(plan, clock.clone())?;
        let actors = Actors::new(deployment.ledger_address(), deployment.sale_address());
        Ok(Self {
            deployment,
            clock,
            actors,
        })
    }

    /// Runs every step, stopping at the first one that does not behave as
    /// expected.
    pub fn run(&mut self, scenario: &Scenario) -> ScenarioReport {
        let mut steps = Vec::with_capacity(scenario.steps.len());
        let mut completed = true;

        for (index, step) in scenario.steps.iter().enumerate() {
            let op = step.action.name();
            let result = self.execute(&step.action);
            let outcome = match (result, step.expect_error.as_deref()) {
                (Ok(()), None) => StepOutcome {
                    index,
                    op,
                    status: StepStatus::Ok,
                    code: None,
                    message: None,
                },
                (Ok(()), Some(_)) => StepOutcome {
                    index,
                    op,
                    status: StepStatus::UnexpectedSuccess,
                    code: None,
                    message: None,
                },
                (Err(err), expected) => {
                    let code = err.error_code();
                    let status = if expected == Some(code) {
                        StepStatus::Rejected
                    } else {
                        StepStatus::UnexpectedRejection
                    };
                    StepOutcome {
                        index,
                        op,
                        status,
                        code: Some(code),
                        message: Some(err.to_string()),
                    }
                }
            };

            let stop = matches!(
                outcome.status,
                StepStatus::UnexpectedRejection | StepStatus::UnexpectedSuccess
            );
            steps.push(outcome);
            if stop {
                warn!(index, op, "Scenario stopped");
                completed = false;
                break;
            }
        }

        info!(steps = steps.len(), completed, "Scenario finished");
        self.report(completed, steps)
    }

    /// Consumes the runner, returning the deployment.
    #[must_use]
    pub fn into_deployment(self) -> Deployment {
        self.deployment
    }

    fn execute(&mut self, action: &Action) -> AppResult<()> {
        let deployment = &self.deployment;
        let actors = &mut self.actors;
        match action {
            Action::SetTime { at } => {
                if !self.clock.advance_to(*at) {
                    return Err(AppError::Input(format!("clock cannot move back to {at}")));
                }
            }
            Action::Advance { seconds } => {
                let advanced =
                    Duration::try_seconds(*seconds).is_some_and(|by| self.clock.advance(by));
                if !advanced {
                    return Err(AppError::Input(format!("cannot advance by {seconds}s")));
                }
            }
            Action::Transfer { caller, to, amount } => {
                let (caller, to) = (actors.resolve(caller), actors.resolve(to));
                deployment.transfer(caller, to, *amount)?;
            }
            Action::Approve {
                caller,
                spender,
                amount,
            } => {
                let (caller, spender) = (actors.resolve(caller), actors.resolve(spender));
                deployment.with(|ledger, _| ledger.approve(caller, spender, *amount))?;
            }
            Action::TransferFrom {
                caller,
                from,
                to,
                amount,
            } => {
                let caller = actors.resolve(caller);
                let (from, to) = (actors.resolve(from), actors.resolve(to));
                deployment.with(|ledger, _| ledger.transfer_from(caller, from, to, *amount))?;
            }
            Action::Burn { caller, amount } => {
                deployment.burn(actors.resolve(caller), *amount)?;
            }
            Action::Freeze { caller } => {
                let caller = actors.resolve(caller);
                deployment.with(|ledger, _| ledger.freeze(caller))?;
            }
            Action::FinalizeLedger { caller } => {
                let caller = actors.resolve(caller);
                deployment.with(|ledger, _| ledger.finalize(caller))?;
            }
            Action::ReclaimLedger { caller } => {
                let caller = actors.resolve(caller);
                deployment.with(|ledger, _| ledger.reclaim(caller))?;
            }
            Action::Whitelist {
                caller,
                accounts,
                admitted,
            } => {
                let caller = actors.resolve(caller);
                let accounts: Vec<_> = accounts.iter().map(|a| actors.resolve(a)).collect();
                match accounts.as_slice() {
                    [single] => deployment.update_whitelist(caller, *single, *admitted)?,
                    many => deployment.update_whitelist_batch(caller, many, *admitted)?,
                }
            }
            Action::Purchase {
                payer,
                beneficiary,
                contribution,
            } => {
                let payer = actors.resolve(payer);
                let beneficiary = beneficiary
                    .as_deref()
                    .map_or(payer, |name| actors.resolve(name));
                let receipt = deployment.purchase(payer, beneficiary, *contribution)?;
                info!(
                    units = %receipt.units,
                    cost = %receipt.cost,
                    refund = %receipt.refund,
                    "Purchase settled"
                );
            }
            Action::SetSaleWindow {
                caller,
                start_time,
                end_time,
            } => {
                let caller = actors.resolve(caller);
                deployment.with(|_, sale| sale.set_sale_window(caller, *start_time, *end_time))?;
            }
            Action::SetBonus { caller, bonus_bps } => {
                let caller = actors.resolve(caller);
                deployment.with(|_, sale| sale.set_bonus(caller, *bonus_bps))?;
            }
            Action::SetTokensPerKether {
                caller,
                tokens_per_kether,
            } => {
                let caller = actors.resolve(caller);
                deployment.with(|_, sale| sale.set_tokens_per_kether(caller, *tokens_per_kether))?;
            }
            Action::SetMaxUnitsPerAccount { caller, amount } => {
                let caller = actors.resolve(caller);
                deployment.with(|_, sale| sale.set_max_units_per_account(caller, *amount))?;
            }
            Action::SetWalletAddress { caller, wallet } => {
                let (caller, wallet) = (actors.resolve(caller), actors.resolve(wallet));
                deployment.with(|_, sale| sale.set_wallet_address(caller, wallet))?;
            }
            Action::Suspend { caller } => {
                let caller = actors.resolve(caller);
                deployment.with(|_, sale| sale.suspend(caller))?;
            }
            Action::Resume { caller } => {
                let caller = actors.resolve(caller);
                deployment.with(|_, sale| sale.resume(caller))?;
            }
            Action::FinalizeSale { caller } => {
                let caller = actors.resolve(caller);
                deployment.with(|_, sale| sale.finalize(caller))?;
            }
            Action::Reclaim { caller } => {
                deployment.reclaim_unsold(actors.resolve(caller))?;
            }
        }
        Ok(())
    }

    fn report(&self, completed: bool, steps: Vec<StepOutcome>) -> ScenarioReport {
        self.deployment.with(|ledger, sale| ScenarioReport {
            completed,
            steps,
            balances: self
                .actors
                .all()
                .map(|(name, id)| (name.to_string(), ledger.balance_of(id).to_string()))
                .collect(),
            ledger_events: ledger.events().as_slice().to_vec(),
            sale_events: sale.events().as_slice().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tally_core::clock::Clock;
    use tally_shared::types::amount::scale_units;

    fn runner() -> ScenarioRunner {
        ScenarioRunner::launch(&AppConfig::default(), None).unwrap()
    }

    fn scenario(json: &str) -> Scenario {
        serde_json::from_str(json).unwrap()
    }

    #[rstest]
    #[case("owner", OWNER)]
    #[case("ops", OPERATIONS)]
    #[case("wallet", WALLET)]
    #[case("zero", AccountId::ZERO)]
    #[case("00000000-0000-0000-0000-00000000002a", AccountId::from_u128(42))]
    fn test_reserved_and_literal_names(#[case] name: &str, #[case] expected: AccountId) {
        let mut actors = Actors::new(AccountId::from_u128(100), AccountId::from_u128(200));
        assert_eq!(actors.resolve(name), expected);
    }

    #[test]
    fn test_named_actors_are_stable() {
        let mut actors = Actors::new(AccountId::from_u128(100), AccountId::from_u128(200));
        let alice = actors.resolve("alice");
        let bob = actors.resolve("bob");
        assert_ne!(alice, bob);
        assert_eq!(actors.resolve("alice"), alice);
        assert_eq!(actors.resolve("sale"), AccountId::from_u128(200));
    }

    #[test]
    fn test_admission_gated_purchase() {
        let mut runner = runner();
        let report = runner.run(&scenario(
            r#"{"steps": [
                {"op": "whitelist", "caller": "ops", "accounts": ["alice"], "admitted": true},
                {"op": "purchase", "payer": "bob", "beneficiary": "alice",
                 "contribution": "100000000000000000", "expect_error": "NOT_WHITELISTED"},
                {"op": "whitelist", "caller": "ops", "accounts": ["bob"], "admitted": true},
                {"op": "purchase", "payer": "bob", "beneficiary": "alice",
                 "contribution": "100000000000000000"}
            ]}"#,
        ));

        assert!(report.completed);
        assert_eq!(report.steps[1].status, StepStatus::Rejected);
        assert_eq!(
            report.balances["alice"],
            scale_units(1, 18).unwrap().to_string()
        );
        assert_eq!(report.balances["bob"], "0");
    }

    #[test]
    fn test_stops_at_unexpected_rejection() {
        let mut runner = runner();
        let report = runner.run(&scenario(
            r#"{"steps": [
                {"op": "transfer", "caller": "alice", "to": "bob", "amount": 1},
                {"op": "freeze", "caller": "owner"}
            ]}"#,
        ));

        assert!(!report.completed);
        assert_eq!(report.steps.len(), 1);
        let failure = report.failure().unwrap();
        assert_eq!(failure.status, StepStatus::UnexpectedRejection);
        assert_eq!(failure.code, Some("UNAUTHORIZED"));
    }

    #[test]
    fn test_unexpected_success_stops() {
        let mut runner = runner();
        let report = runner.run(&scenario(
            r#"{"steps": [
                {"op": "freeze", "caller": "owner", "expect_error": "UNAUTHORIZED"}
            ]}"#,
        ));
        assert_eq!(
            report.failure().map(|step| step.status),
            Some(StepStatus::UnexpectedSuccess)
        );
    }

    #[test]
    fn test_clock_only_moves_forward() {
        let mut runner = runner();
        let report = runner.run(&scenario(
            r#"{"steps": [
                {"op": "advance", "seconds": 60},
                {"op": "set_time", "at": "2000-01-01T00:00:00Z", "expect_error": "INVALID_INPUT"}
            ]}"#,
        ));
        assert!(report.completed);
    }

    #[test]
    fn test_out_of_range_advance_is_rejected() {
        let mut runner = runner();
        let before = runner.clock.now();
        let report = runner.run(&scenario(
            r#"{"steps": [
                {"op": "advance", "seconds": 9000000000000000, "expect_error": "INVALID_INPUT"},
                {"op": "advance", "seconds": -5, "expect_error": "INVALID_INPUT"},
                {"op": "advance", "seconds": 30}
            ]}"#,
        ));
        assert!(report.completed, "{:?}", report.failure());
        assert_eq!(runner.clock.now(), before + Duration::seconds(30));
    }

    #[test]
    fn test_demo_scenario_completes() {
        let demo = scenario(include_str!("../../../demos/sale.json"));
        let mut runner = ScenarioRunner::launch(&AppConfig::default(), demo.start_time).unwrap();
        let report = runner.run(&demo);

        assert!(report.completed, "{:?}", report.failure());
        assert_eq!(report.balances["alice"], "0");
        assert_eq!(
            report.balances["bob"],
            scale_units(3, 18).unwrap().to_string()
        );
        assert_eq!(report.balances["sale"], "0");
    }

    #[test]
    fn test_burn_and_reclaim_report_events() {
        let mut runner = runner();
        let report = runner.run(&scenario(
            r#"{"steps": [
                {"op": "reclaim", "caller": "owner"},
                {"op": "reclaim", "caller": "owner"},
                {"op": "burn", "caller": "owner", "amount": "1000"}
            ]}"#,
        ));

        assert!(report.completed);
        assert_eq!(report.balances["sale"], "0");
        assert!(matches!(
            report.ledger_events.last(),
            Some(LedgerEvent::Burn { .. })
        ));
        let reclaims = report
            .sale_events
            .iter()
            .filter(|event| matches!(event, SaleEvent::TokensReclaimed { .. }))
            .count();
        assert_eq!(reclaims, 1);
    }
}
