use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use poolsync::collector::{CollectionResult, Collector, SchedulerRunContext};
use poolsync::config::Config;
use poolsync::credentials::CredentialStore;
use poolsync::error::{Error, Result};
use poolsync::metrics;
use poolsync::models::Tier;
use poolsync::storage::SqliteStorage;
use poolsync::utils::truncate_text;

/// Run one tier against the configured SQLite store
///
/// Returns whether the tier met its success policy. Failures that stop the
/// tier from running at all come back as [`Error`], classified by category.
pub async fn collect(
    config: Config,
    tier: Tier,
    coin: Option<String>,
    cancel: CancellationToken,
    json: bool,
    metrics_out: Option<&Path>,
) -> Result<bool> {
    config
        .validate()
        .map_err(|e| Error::config(format!("{e:#}")))?;
    let coin = coin.unwrap_or_else(|| config.collector.default_coin.clone());

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    tracing::debug!(path = %config.database.sqlite_path.display(), "Opening database");
    let storage = SqliteStorage::new(&config.database.sqlite_path)?;
    let credentials = CredentialStore::from_env(config.accounts.clone());
    let ctx = SchedulerRunContext::from_config(&config).with_cancel(cancel);

    tracing::info!(
        tier = %tier,
        coin = %coin,
        run_id = %ctx.run_id(),
        accounts = credentials.accounts().len(),
        "Starting collection"
    );

    let collector = Collector::new(config, credentials, Arc::new(storage))?;
    let result = collector.run(&ctx, tier, &coin).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    if let Some(path) = metrics_out {
        if let Err(e) = metrics::write_metrics(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write metrics file");
        }
    }

    Ok(result.success)
}

fn print_summary(result: &CollectionResult) {
    println!("\n{} Summary ({})", result.tier.as_str().to_uppercase(), result.coin);
    println!("==================");
    println!("Run ID: {}", result.run_id);
    println!(
        "Accounts: {}/{} processed",
        result.accounts_processed, result.accounts_attempted
    );
    println!("Records collected: {}", result.records_collected);
    if result.raw_captured > 0 {
        println!("Raw payloads kept: {}", result.raw_captured);
    }
    println!("API calls: {}", result.api_calls);
    println!(
        "Failed accounts: {} ({:.1}%)",
        result.failed_accounts(),
        result.error_rate() * 100.0
    );

    if result.budget_exhausted {
        println!("Stopped early: rate budget exhausted");
    }
    if result.cancelled {
        println!("Stopped early: run cancelled");
    }

    if !result.offline_accounts.is_empty() {
        println!("\nOffline Accounts");
        println!("----------------");
        for offline in &result.offline_accounts {
            println!(
                "  {}: {}/{} workers active",
                offline.account, offline.active_workers, offline.total_workers
            );
        }
    }

    if !result.account_summaries.is_empty() {
        println!("\nWorker Summaries");
        println!("----------------");
        for (account, summary) in &result.account_summaries {
            println!(
                "  {account}: {} total, {} active, {} inactive, {} invalid",
                summary.total, summary.active, summary.inactive, summary.invalid
            );
        }
    }

    if !result.cleanup.is_empty() {
        println!("\nRetention Cleanup");
        println!("-----------------");
        for report in &result.cleanup {
            match &report.error {
                None => println!(
                    "  {} (>{}d): {} rows deleted",
                    report.table, report.retention_days, report.deleted
                ),
                Some(error) => println!("  {}: FAILED ({error})", report.table),
            }
        }
    }

    if !result.errors.is_empty() {
        println!("\nErrors");
        println!("------");
        for error in &result.errors {
            println!(
                "  {} [{}{}]: {}",
                error.account,
                error.category,
                if error.recoverable { ", retry later" } else { "" },
                truncate_text(&error.message, 120)
            );
        }
    }

    for warning in &result.warnings {
        println!("Warning: {warning}");
    }

    println!("\nResult: {}", if result.success { "SUCCESS" } else { "FAILED" });
}
