// Core data structures for the poolsync collector

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Primary,
    #[default]
    Sub,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Sub => "sub",
        }
    }
}

/// Collection tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Balance and hashrate summary, every 10 minutes
    Tier1,
    /// Full worker lists, hourly
    Tier2,
    /// Detailed fetch for problem accounts, every few hours
    Tier3,
    /// Payment history and retention cleanup, daily
    Tier4,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tier1 => "tier1",
            Self::Tier2 => "tier2",
            Self::Tier3 => "tier3",
            Self::Tier4 => "tier4",
        }
    }

    pub fn all() -> [Self; 4] {
        [Self::Tier1, Self::Tier2, Self::Tier3, Self::Tier4]
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciled worker liveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Online,
    Offline,
    Unknown,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for WorkerStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "online" => Self::Online,
            "offline" => Self::Offline,
            _ => Self::Unknown,
        })
    }
}

/// Normalized worker row, appended once per collection cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub account: String,
    pub name: String,
    pub status: WorkerStatus,
    /// Hashes per second
    pub hashrate_1h: u64,
    /// Hashes per second
    pub hashrate_24h: u64,
    pub reject_rate_percent: f64,
    pub last_share_time: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
}

/// Account balance snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub account: String,
    pub coin: String,
    pub earn_24h: f64,
    pub earn_total: f64,
    pub paid_out: f64,
    pub balance: f64,
    pub settle_time: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// Account hashrate summary snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashrateRecord {
    pub account: String,
    pub coin: String,
    pub last_10m: u64,
    pub last_1h: u64,
    pub last_1d: u64,
    pub prev_10m: u64,
    pub prev_1h: u64,
    pub prev_1d: u64,
    pub accepted_shares: u64,
    pub stale_shares: u64,
    pub duplicate_shares: u64,
    pub other_shares: u64,
    pub total_workers: u32,
    pub active_workers: u32,
    pub observed_at: DateTime<Utc>,
}

impl HashrateRecord {
    /// Workers exist but none of them is active
    pub fn is_offline(&self) -> bool {
        self.total_workers > 0 && self.active_workers == 0
    }
}

/// Where an account overview row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverviewSource {
    /// Computed from a worker walk
    WorkerSummary,
    /// Returned by the account overview endpoint
    Upstream,
}

impl OverviewSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkerSummary => "worker_summary",
            Self::Upstream => "upstream",
        }
    }
}

/// Per-account worker counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub invalid: usize,
}

impl AccountSummary {
    /// Count one normalized worker
    pub fn record(&mut self, status: WorkerStatus) {
        self.total += 1;
        match status {
            WorkerStatus::Online => self.active += 1,
            WorkerStatus::Offline => self.inactive += 1,
            WorkerStatus::Unknown => {}
        }
    }

    /// Count one row that could not be normalized
    pub fn record_invalid(&mut self) {
        self.invalid += 1;
    }
}

/// Account overview snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountOverviewRecord {
    pub account: String,
    pub coin: String,
    pub source: OverviewSource,
    pub summary: AccountSummary,
    pub hashrate_1h: u64,
    pub hashrate_24h: u64,
    pub observed_at: DateTime<Utc>,
}

/// Payment history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub account: String,
    pub coin: String,
    pub payment_type: String,
    pub amount: f64,
    pub tx_id: Option<String>,
    pub address: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
}

/// One upstream call, as logged to storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCallRecord {
    pub endpoint: String,
    pub account: Option<String>,
    pub success: bool,
    pub duration_ms: u64,
    pub error_kind: Option<String>,
    pub called_at: DateTime<Utc>,
}

/// Why an upstream payload was kept verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureReason {
    /// Rows the normalizer could not turn into records
    Unparsed,
    /// Whole payload, kept because every response is captured
    Response,
}

impl CaptureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unparsed => "unparsed",
            Self::Response => "response",
        }
    }
}

/// Upstream payload stored as JSON text, outside the normalized tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResponseRecord {
    pub account: String,
    pub endpoint: String,
    pub coin: String,
    pub reason: CaptureReason,
    pub row_count: usize,
    pub payload: String,
    pub captured_at: DateTime<Utc>,
}

/// Account flagged by tier 1 because none of its workers is active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineAccount {
    pub account: String,
    pub total_workers: u32,
    pub active_workers: u32,
}
