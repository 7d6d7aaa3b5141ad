//! Subcommand implementations.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use tally_core::deployment::DeploymentSnapshot;
use tally_core::sale::{ImportPlan, ImportReport, WhitelistEntry, WhitelistImport};
use tally_shared::types::amount::format_units;
use tally_shared::{AppConfig, AppError};

use crate::scenario::{OPERATIONS, Scenario, ScenarioRunner};

#[derive(Debug, Serialize)]
struct DeploySummary {
    supply: String,
    sale_stock: String,
    #[serde(flatten)]
    snapshot: DeploymentSnapshot,
}

#[derive(Debug, Serialize)]
struct WhitelistSummary {
    plan: ImportPlan,
    report: ImportReport,
}

/// `tally deploy`
pub fn deploy(config: &AppConfig) -> anyhow::Result<()> {
    let runner = ScenarioRunner::launch(config, None)?;
    let deployment = runner.into_deployment();
    let snapshot = deployment.snapshot();

    let decimals = snapshot.ledger.decimals;
    let sale_stock = deployment.balance_of(snapshot.sale.address);
    let summary = DeploySummary {
        supply: format_units(snapshot.ledger.total_supply, decimals),
        sale_stock: format_units(sale_stock, decimals),
        snapshot,
    };
    print_json(&summary)
}

/// `tally whitelist <file>`
pub fn whitelist(
    config: &AppConfig,
    path: &Path,
    batch_size: Option<usize>,
) -> anyhow::Result<()> {
    let entries: Vec<WhitelistEntry> = read_json(path)?;
    let import = WhitelistImport::new(
        entries,
        batch_size.unwrap_or(config.whitelist.max_batch_size),
    )
    .map_err(AppError::from)?;

    let deployment = ScenarioRunner::launch(config, None)?.into_deployment();
    let plan = deployment.with(|_, sale| import.plan(sale));
    let report = deployment
        .import_whitelist(OPERATIONS, &import)
        .map_err(AppError::from)?;

    info!(
        added = report.added.len(),
        removed = report.removed.len(),
        unchanged = report.unchanged.len(),
        batches = report.batches,
        "Whitelist import applied"
    );
    print_json(&WhitelistSummary { plan, report })
}

/// `tally run <scenario>`
pub fn run(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    let scenario: Scenario = read_json(path)?;
    let mut runner = ScenarioRunner::launch(config, scenario.start_time)?;
    let report = runner.run(&scenario);
    print_json(&report)?;

    if let Some(failure) = report.failure() {
        let err = AppError::Rejected {
            code: failure.code.unwrap_or("UNEXPECTED_SUCCESS"),
            message: format!("step {} ({}) did not behave as expected", failure.index, failure.op),
        };
        return Err(err.into());
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = fs::read_to_string(path)
        .map_err(AppError::from)
        .with_context(|| format!("reading {}", path.display()))?;
    let value = serde_json::from_str(&text)
        .map_err(AppError::from)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(value)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| AppError::Internal(e.to_string()))?;
    println!("{text}");
    Ok(())
}
