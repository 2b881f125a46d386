//! Configuration management for the poolsync collector
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Credentials are deliberately not part of this
//! structure; they are resolved per account by [`crate::credentials`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::credentials::AccountSpec;
use crate::models::CaptureReason;
use crate::storage::Table;
use crate::utils::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Upstream API configuration
    pub api: ApiConfig,

    /// Per-run call budget
    pub budget: BudgetConfig,

    /// Tier collection policy
    pub collector: CollectorConfig,

    /// Retention windows used by tier 4 cleanup
    pub retention: RetentionConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Account registry override; the built-in registry is used when absent
    pub accounts: Option<Vec<AccountSpec>>,
}

/// Upstream API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL that endpoint paths are appended to
    pub base_url: String,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Maximum retries for transient failures
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds
    pub retry_base_delay_ms: u64,

    /// Cap for a single backoff delay in milliseconds
    pub retry_max_delay_ms: u64,

    /// Minimum spacing between two calls in milliseconds (0 disables pacing)
    pub min_interval_ms: u64,

    /// Delay between successive page fetches in milliseconds
    pub page_delay_ms: u64,

    /// Rows requested per page
    pub page_size: u32,

    /// Hard stop for a single pagination walk
    pub max_pages: u32,

    /// User agent string
    pub user_agent: String,
}

/// Rolling-window call budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Calls allowed per window
    pub ceiling: u32,

    /// Window length in seconds
    pub window_secs: u64,
}

/// Tier collection policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Coin used when the caller does not select one
    pub default_coin: String,

    /// A tier fails once errors / attempted accounts reaches this ratio
    pub error_threshold: f64,

    /// How far back tier 3 looks for problem signals, in hours
    pub problem_lookback_hours: u32,

    /// Upper bound on accounts selected by tier 3
    pub problem_limit: usize,

    /// Treat a zero 1h hashrate as a problem signal
    pub problem_zero_hashrate: bool,

    /// Treat inactive workers in the latest summary as a problem signal
    pub problem_inactive_workers: bool,

    /// Accounts used by tier 3 when problem detection fails
    pub problem_fallback_count: usize,

    /// A share newer than this many minutes counts as recent
    pub share_freshness_mins: u32,

    /// Pages of payment history fetched per account by tier 4
    pub payment_max_pages: u32,

    /// Which upstream payloads are kept verbatim in `raw_responses`
    pub raw_capture: RawCapture,
}

/// Raw payload capture mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RawCapture {
    /// Keep nothing
    Off,
    /// Keep rows the normalizer rejected
    #[default]
    Invalid,
    /// Keep every payload, plus rejected rows
    All,
}

impl RawCapture {
    /// Whether a payload captured for `reason` should be stored
    pub fn keeps(&self, reason: CaptureReason) -> bool {
        match self {
            Self::Off => false,
            Self::Invalid => reason == CaptureReason::Unparsed,
            Self::All => true,
        }
    }
}

impl std::str::FromStr for RawCapture {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "invalid" => Ok(Self::Invalid),
            "all" => Ok(Self::All),
            other => Err(format!("unknown raw capture mode: {other}")),
        }
    }
}

/// Retention windows in days; 0 keeps rows forever
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub balances_days: u32,
    pub hashrates_days: u32,
    pub workers_days: u32,
    pub account_overviews_days: u32,
    pub payments_days: u32,
    pub api_calls_days: u32,
    pub raw_responses_days: u32,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://antpool.com/api"),
            request_timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            min_interval_ms: 1000,
            page_delay_ms: 500,
            page_size: 50,
            max_pages: 200,
            user_agent: format!("poolsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            ceiling: 580,
            window_secs: 600,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            default_coin: String::from("BTC"),
            error_threshold: 0.5,
            problem_lookback_hours: 3,
            problem_limit: 10,
            problem_zero_hashrate: true,
            problem_inactive_workers: true,
            problem_fallback_count: 5,
            share_freshness_mins: 30,
            payment_max_pages: 2,
            raw_capture: RawCapture::default(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            balances_days: 3,
            hashrates_days: 3,
            workers_days: 7,
            account_overviews_days: 7,
            payments_days: 0,
            api_calls_days: 3,
            raw_responses_days: 7,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/poolsync.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a file, then let environment variables override it
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("POOLSYNC_BASE_URL") {
            self.api.base_url = url;
        }
        if let Some(v) = env_parse("POOLSYNC_REQUEST_TIMEOUT") {
            self.api.request_timeout_secs = v;
        }
        if let Some(v) = env_parse("POOLSYNC_MAX_RETRIES") {
            self.api.max_retries = v;
        }
        if let Some(v) = env_parse("POOLSYNC_MIN_INTERVAL_MS") {
            self.api.min_interval_ms = v;
        }
        if let Some(v) = env_parse("POOLSYNC_PAGE_SIZE") {
            self.api.page_size = v;
        }
        if let Some(v) = env_parse("POOLSYNC_BUDGET_CEILING") {
            self.budget.ceiling = v;
        }
        if let Some(v) = env_parse("POOLSYNC_BUDGET_WINDOW_SECS") {
            self.budget.window_secs = v;
        }
        if let Ok(coin) = std::env::var("POOLSYNC_COIN") {
            self.collector.default_coin = coin;
        }
        if let Some(mode) = env_parse("POOLSYNC_RAW_CAPTURE") {
            self.collector.raw_capture = mode;
        }
        if let Ok(path) = std::env::var("POOLSYNC_SQLITE_PATH") {
            self.database.sqlite_path = PathBuf::from(path);
        }
        if let Ok(level) = std::env::var("POOLSYNC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("POOLSYNC_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            anyhow::bail!("api.base_url must not be empty");
        }

        url::Url::parse(&self.api.base_url)
            .with_context(|| format!("api.base_url is not a valid URL: {}", self.api.base_url))?;

        if self.api.request_timeout_secs == 0 {
            anyhow::bail!("api.request_timeout_secs must be greater than 0");
        }

        if self.api.page_size == 0 {
            anyhow::bail!("api.page_size must be greater than 0");
        }

        if self.api.max_pages == 0 {
            anyhow::bail!("api.max_pages must be greater than 0");
        }

        if self.budget.ceiling == 0 {
            anyhow::bail!("budget.ceiling must be greater than 0");
        }

        if self.budget.window_secs == 0 {
            anyhow::bail!("budget.window_secs must be greater than 0");
        }

        if !(self.collector.error_threshold > 0.0 && self.collector.error_threshold <= 1.0) {
            anyhow::bail!("collector.error_threshold must be in (0, 1]");
        }

        if let Some(accounts) = &self.accounts {
            let mut seen = std::collections::HashSet::new();
            for account in accounts {
                if !seen.insert(account.name.as_str()) {
                    anyhow::bail!("duplicate account in registry: {}", account.name);
                }
            }
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    /// Backoff settings for the request client
    #[must_use]
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::with_delays(
            self.api.max_retries,
            self.api.retry_base_delay_ms,
            self.api.retry_max_delay_ms,
        )
    }

    /// Budget window as Duration
    #[must_use]
    pub fn budget_window(&self) -> Duration {
        Duration::from_secs(self.budget.window_secs)
    }
}

impl RetentionConfig {
    /// Retention for a table, `None` when rows are kept forever
    pub fn for_table(&self, table: Table) -> Option<chrono::Duration> {
        let days = match table {
            Table::Balances => self.balances_days,
            Table::Hashrates => self.hashrates_days,
            Table::Workers => self.workers_days,
            Table::AccountOverviews => self.account_overviews_days,
            Table::Payments => self.payments_days,
            Table::ApiCalls => self.api_calls_days,
            Table::RawResponses => self.raw_responses_days,
        };
        (days > 0).then(|| chrono::Duration::days(i64::from(days)))
    }
}
