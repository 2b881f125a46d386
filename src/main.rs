mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use poolsync::config::Config;
use poolsync::error::PoolsyncErrorTrait;
use poolsync::models::Tier;

#[derive(Parser)]
#[command(
    name = "poolsync",
    version,
    about = "Tiered mining-pool API collector with a shared rate budget",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (environment variables still override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Cancel the run after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Write Prometheus text exposition to this file after the run
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    /// Coin type to collect
    #[arg(long)]
    coin: Option<String>,

    /// Print the run result as JSON instead of a summary
    #[arg(long, default_value = "false")]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Balance and hashrate summary for every account
    Tier1(RunArgs),

    /// Full worker lists for every account
    Tier2(RunArgs),

    /// Detailed fetch for problem accounts
    Tier3(RunArgs),

    /// Payment history, then retention cleanup
    Tier4(RunArgs),

    /// Check configuration, credentials, storage and upstream access
    Health {
        /// Skip the signed pool statistics call
        #[arg(long)]
        offline: bool,
    },

    /// List registered accounts and credential status
    Accounts,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    let (tier, args) = match cli.command {
        Commands::Tier1(args) => (Tier::Tier1, args),
        Commands::Tier2(args) => (Tier::Tier2, args),
        Commands::Tier3(args) => (Tier::Tier3, args),
        Commands::Tier4(args) => (Tier::Tier4, args),
        Commands::Health { offline } => {
            let healthy = commands::health(config, offline).await?;
            return Ok(exit_code(healthy));
        }
        Commands::Accounts => {
            commands::accounts(&config)?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    let cancel = CancellationToken::new();
    spawn_cancel_watcher(cancel.clone(), cli.timeout_secs.map(Duration::from_secs));

    let outcome = commands::collect(
        config,
        tier,
        args.coin,
        cancel.clone(),
        args.json,
        cli.metrics_out.as_deref(),
    )
    .await;
    cancel.cancel();

    let success = match outcome {
        Ok(success) => success,
        Err(e) => {
            tracing::error!(
                tier = %tier,
                category = %e.category(),
                recoverable = e.is_recoverable(),
                error = %e,
                "Collection could not run"
            );
            return Err(e.into());
        }
    };

    tracing::info!(tier = %tier, success, "poolsync finished");
    Ok(exit_code(success))
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Cancel `token` on Ctrl-C or once `timeout` elapses
fn spawn_cancel_watcher(token: CancellationToken, timeout: Option<Duration>) {
    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupt received, stopping after the current account");
            }
            () = deadline => {
                tracing::warn!(timeout = ?timeout, "Run timed out, stopping after the current account");
            }
            () = token.cancelled() => return,
        }
        token.cancel();
    });
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            tracing_subscriber::EnvFilter::new("poolsync=debug,info")
        } else {
            tracing_subscriber::EnvFilter::new(format!("poolsync={level},warn"))
        }
    });

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?;
        }
    }

    Ok(())
}
