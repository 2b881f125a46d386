//! Storage gateway for normalized records
//!
//! The collector depends only on the [`StorageGateway`] trait. Two backends
//! are provided:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Tiered collector               │
//! └─────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────┐
//! │            StorageGateway trait             │
//! └─────────────────────────────────────────────┘
//!             │                     │
//!             ▼                     ▼
//! ┌─────────────────────┐ ┌─────────────────────┐
//! │    SqliteStorage    │ │    MemoryStorage    │
//! │  (rusqlite, WAL)    │ │ (tests, fail points)│
//! └─────────────────────┘ └─────────────────────┘
//! ```
//!
//! Records are appended, never deduplicated. Retention is enforced by
//! `cleanup_older_than`, which the daily tier calls per table.

pub mod memory;
pub mod sqlite;

pub use memory::{FailPoint, MemoryStorage};
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;

use crate::models::{
    AccountKind, AccountOverviewRecord, ApiCallRecord, BalanceRecord, HashrateRecord,
    PaymentRecord, RawResponseRecord, WorkerRecord,
};
use crate::utils::error::StorageResult;

/// Tables subject to retention cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Balances,
    Hashrates,
    Workers,
    AccountOverviews,
    Payments,
    ApiCalls,
    RawResponses,
}

impl Table {
    /// SQL table name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Balances => "account_balances",
            Self::Hashrates => "hashrates",
            Self::Workers => "workers",
            Self::AccountOverviews => "account_overviews",
            Self::Payments => "payments",
            Self::ApiCalls => "api_call_logs",
            Self::RawResponses => "raw_responses",
        }
    }

    /// Column compared against the retention cutoff
    pub fn timestamp_column(&self) -> &'static str {
        match self {
            Self::ApiCalls => "called_at",
            Self::RawResponses => "captured_at",
            _ => "observed_at",
        }
    }

    pub fn all() -> [Self; 7] {
        [
            Self::Balances,
            Self::Hashrates,
            Self::Workers,
            Self::AccountOverviews,
            Self::Payments,
            Self::ApiCalls,
            Self::RawResponses,
        ]
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row counts per table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub accounts: usize,
    pub balances: usize,
    pub hashrates: usize,
    pub workers: usize,
    pub account_overviews: usize,
    pub payments: usize,
    pub api_calls: usize,
    pub raw_responses: usize,
}

impl StorageStats {
    pub fn rows(&self, table: Table) -> usize {
        match table {
            Table::Balances => self.balances,
            Table::Hashrates => self.hashrates,
            Table::Workers => self.workers,
            Table::AccountOverviews => self.account_overviews,
            Table::Payments => self.payments,
            Table::ApiCalls => self.api_calls,
            Table::RawResponses => self.raw_responses,
        }
    }
}

/// Selection policy for accounts that deserve a detailed fetch
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemCriteria {
    /// Only snapshots observed at or after this instant are considered
    pub since: DateTime<Utc>,
    pub limit: usize,
    /// Latest hashrate snapshot shows zero 1h hashrate
    pub zero_hashrate: bool,
    /// Latest worker summary has inactive workers
    pub inactive_workers: bool,
}

/// Canonical text form for stored timestamps; sorts chronologically
pub(crate) fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Persistence boundary of the collector
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Create or refresh an account row and return its id
    async fn upsert_account(
        &self,
        name: &str,
        kind: AccountKind,
        subject_id: &str,
    ) -> StorageResult<i64>;

    async fn insert_balance(&self, record: &BalanceRecord) -> StorageResult<()>;

    async fn insert_hashrate(&self, record: &HashrateRecord) -> StorageResult<()>;

    /// Append a batch of workers, returning the number of rows written
    async fn insert_worker_batch(&self, records: &[WorkerRecord]) -> StorageResult<usize>;

    async fn insert_account_overview(&self, record: &AccountOverviewRecord) -> StorageResult<()>;

    async fn insert_payment(&self, record: &PaymentRecord) -> StorageResult<()>;

    async fn log_api_call(&self, record: &ApiCallRecord) -> StorageResult<()>;

    /// Keep an upstream payload verbatim so rejected rows can be reprocessed
    async fn insert_raw_response(&self, record: &RawResponseRecord) -> StorageResult<()>;

    /// Accounts whose recent snapshots look unhealthy
    async fn problem_accounts(&self, criteria: &ProblemCriteria) -> StorageResult<Vec<String>>;

    /// Delete rows older than `age`, returning how many were removed
    async fn cleanup_older_than(&self, table: Table, age: chrono::Duration)
        -> StorageResult<usize>;

    async fn stats(&self) -> StorageResult<StorageStats>;
}
