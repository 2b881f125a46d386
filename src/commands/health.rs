use anyhow::Result;
use std::sync::Arc;

use poolsync::client::{Endpoint, PoolClient, RateBudget};
use poolsync::config::Config;
use poolsync::credentials::{Credential, CredentialStore};
use poolsync::error::PoolsyncErrorTrait;
use poolsync::storage::{SqliteStorage, StorageGateway, Table};
use poolsync::utils::{mask_secret, truncate_text};

/// Check configuration, credentials, storage and (unless `offline`) one
/// signed upstream call; `true` when all pass
pub async fn health(config: Config, offline: bool) -> Result<bool> {
    println!("Health Check");
    println!("============");

    let mut healthy = true;

    match config.validate() {
        Ok(()) => println!("Configuration: OK ({})", config.api.base_url),
        Err(e) => {
            healthy = false;
            println!("Configuration: FAILED ({e:#})");
        }
    }
    println!(
        "Rate budget: {} calls per {}s",
        config.budget.ceiling, config.budget.window_secs
    );

    let credentials = CredentialStore::from_env(config.accounts.clone());
    let total = credentials.accounts().len();
    let mut missing = Vec::new();
    let mut first_resolved: Option<Credential> = None;
    for spec in credentials.accounts() {
        match credentials.resolve(&spec.name) {
            Ok(credential) => {
                first_resolved.get_or_insert(credential);
            }
            Err(e) => missing.push(format!("[{}] {e}", e.category())),
        }
    }
    println!("Credentials: {}/{} accounts resolved", total - missing.len(), total);
    for problem in &missing {
        println!("  {problem}");
    }
    if total == 0 || missing.len() == total {
        healthy = false;
    }

    println!("\nStorage");
    println!("-------");
    println!("Path: {}", config.database.sqlite_path.display());
    match SqliteStorage::new(&config.database.sqlite_path) {
        Ok(storage) => match storage.stats().await {
            Ok(stats) => {
                println!("Accounts: {}", stats.accounts);
                for table in Table::all() {
                    println!("{table}: {}", stats.rows(table));
                }
            }
            Err(e) => {
                healthy = false;
                println!("FAILED to read stats ({e})");
            }
        },
        Err(e) => {
            healthy = false;
            println!("FAILED to open [{}] ({e})", e.category());
        }
    }

    println!("\nUpstream");
    println!("--------");
    if offline {
        println!("Skipped");
    } else if let Some(credential) = first_resolved {
        healthy &= check_upstream(&config, &credential).await;
    } else {
        healthy = false;
        println!("FAILED: no account has credentials to sign with");
    }

    println!("\nStatus: {}", if healthy { "HEALTHY" } else { "UNHEALTHY" });
    Ok(healthy)
}

/// One signed pool statistics call, spending a single unit of a private budget
async fn check_upstream(config: &Config, credential: &Credential) -> bool {
    let budget = Arc::new(RateBudget::new(1, config.budget_window()));
    let client = match PoolClient::new(config, budget) {
        Ok(client) => client,
        Err(e) => {
            println!("FAILED [{}] ({e})", e.category());
            return false;
        }
    };

    let coin = &config.collector.default_coin;
    match client.call(Endpoint::PoolStats, credential, coin, &[]).await {
        Ok(payload) => {
            let data = payload.into_value();
            let status = data
                .get("poolStatus")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            println!("Pool stats ({coin}): OK, pool status {status}");
            true
        }
        Err(e) => {
            let hint = if e.is_recoverable() { ", may pass on retry" } else { "" };
            println!("Pool stats ({coin}): FAILED [{}{hint}] ({e})", e.category());
            false
        }
    }
}

/// List the account registry and whether each account's credentials resolve
pub fn accounts(config: &Config) -> Result<()> {
    let credentials = CredentialStore::from_env(config.accounts.clone());

    println!("{:<24} {:<8} {:<10} STATUS", "ACCOUNT", "KIND", "KEY");
    for spec in credentials.accounts() {
        let (key, status) = match credentials.resolve(&spec.name) {
            Ok(credential) => (mask_secret(&credential.api_key), "ok".to_string()),
            Err(e) => (String::from("-"), truncate_text(&e.to_string(), 60)),
        };
        println!(
            "{:<24} {:<8} {:<10} {status}",
            spec.name,
            spec.kind.as_str(),
            key
        );
    }
    println!("\nTotal: {} accounts", credentials.accounts().len());
    Ok(())
}
