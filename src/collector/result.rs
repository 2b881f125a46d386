//! Per-tier run reports

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use crate::models::{AccountSummary, OfflineAccount, Tier};
use crate::storage::Table;
use crate::error::{
    ClientError, CredentialError, ErrorCategory, PoolsyncErrorTrait, StorageError,
};
use crate::utils::ratio;

/// One failure recorded at the account-iteration boundary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountError {
    pub account: String,
    pub category: ErrorCategory,
    /// Whether a later run may succeed without operator action
    pub recoverable: bool,
    pub message: String,
}

impl AccountError {
    /// Classify `error` through [`PoolsyncErrorTrait`]
    pub fn new<E: PoolsyncErrorTrait>(account: &str, error: &E) -> Self {
        Self {
            account: account.to_string(),
            category: error.category(),
            recoverable: error.is_recoverable(),
            message: error.to_string(),
        }
    }

    pub fn credential(account: &str, error: &CredentialError) -> Self {
        Self::new(account, error)
    }

    pub fn storage(account: &str, error: &StorageError) -> Self {
        Self::new(account, error)
    }

    /// Hard client failures; soft stops never become account errors
    pub fn client(account: &str, error: &ClientError) -> Self {
        Self::new(account, error)
    }
}

/// Outcome of cleaning one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    pub table: Table,
    pub retention_days: i64,
    pub deleted: usize,
    pub error: Option<String>,
}

/// Aggregate of one tier run, reported to the caller and never persisted
#[derive(Debug, Clone, Serialize)]
pub struct CollectionResult {
    pub tier: Tier,
    pub coin: String,
    pub run_id: Uuid,
    pub success: bool,
    pub accounts_attempted: usize,
    pub accounts_processed: usize,
    pub records_collected: usize,
    /// Upstream payloads kept verbatim in the raw response table
    pub raw_captured: usize,
    /// Budget units consumed by this tier (every HTTP attempt)
    pub api_calls: u32,
    pub errors: Vec<AccountError>,
    pub offline_accounts: Vec<OfflineAccount>,
    pub account_summaries: BTreeMap<String, AccountSummary>,
    pub cleanup: Vec<CleanupReport>,
    /// Run-level notes that are not account failures
    pub warnings: Vec<String>,
    pub budget_exhausted: bool,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CollectionResult {
    pub fn new(tier: Tier, coin: &str, run_id: Uuid) -> Self {
        Self {
            tier,
            coin: coin.to_string(),
            run_id,
            success: false,
            accounts_attempted: 0,
            accounts_processed: 0,
            records_collected: 0,
            raw_captured: 0,
            api_calls: 0,
            errors: Vec::new(),
            offline_accounts: Vec::new(),
            account_summaries: BTreeMap::new(),
            cleanup: Vec::new(),
            warnings: Vec::new(),
            budget_exhausted: false,
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record_error(&mut self, error: AccountError) {
        self.errors.push(error);
    }

    /// Distinct accounts with at least one recorded error
    pub fn failed_accounts(&self) -> usize {
        self.errors
            .iter()
            .map(|e| e.account.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn has_errors_for(&self, account: &str) -> bool {
        self.errors.iter().any(|e| e.account == account)
    }

    pub fn error_rate(&self) -> f64 {
        ratio(self.failed_accounts(), self.accounts_attempted)
    }

    /// Stamp the finish time and apply the majority-tolerance policy
    pub fn finish(&mut self, error_threshold: f64, api_calls: u32) {
        self.api_calls = api_calls;
        self.success = is_successful(self.failed_accounts(), self.accounts_attempted, error_threshold);
        self.finished_at = Some(Utc::now());
    }

    pub fn cleanup_failures(&self) -> usize {
        self.cleanup.iter().filter(|c| c.error.is_some()).count()
    }

    pub fn deleted_rows(&self) -> usize {
        self.cleanup.iter().map(|c| c.deleted).sum()
    }
}

/// Success while the share of failed accounts stays below `threshold`;
/// a run that attempted nothing succeeds only if nothing failed
pub fn is_successful(failed: usize, attempted: usize, threshold: f64) -> bool {
    if attempted == 0 {
        return failed == 0;
    }
    ratio(failed, attempted) < threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(account: &str) -> AccountError {
        AccountError {
            account: account.to_string(),
            category: ErrorCategory::Upstream,
            recoverable: false,
            message: "denied".to_string(),
        }
    }

    #[test]
    fn test_majority_tolerance() {
        assert!(is_successful(4, 10, 0.5));
        assert!(!is_successful(5, 10, 0.5));
        assert!(!is_successful(6, 10, 0.5));
        assert!(is_successful(0, 0, 0.5));
        assert!(!is_successful(1, 0, 0.5));
    }

    #[test]
    fn test_failed_accounts_are_distinct() {
        let mut result = CollectionResult::new(Tier::Tier1, "BTC", Uuid::new_v4());
        result.accounts_attempted = 2;
        result.record_error(error("a"));
        result.record_error(error("a"));
        assert_eq!(result.failed_accounts(), 1);
        assert!(result.has_errors_for("a"));
        assert!(!result.has_errors_for("b"));

        result.finish(0.5, 4);
        assert!(!result.success);
        assert_eq!(result.api_calls, 4);
        assert!(result.finished_at.is_some());
    }

    #[test]
    fn test_client_errors_are_classified() {
        let app = AccountError::client(
            "a",
            &ClientError::Application {
                code: 1,
                message: "x".into(),
            },
        );
        assert_eq!(app.category, ErrorCategory::Upstream);
        assert!(!app.recoverable);

        let transport = AccountError::client(
            "a",
            &ClientError::Transport {
                attempts: 4,
                message: "timeout".into(),
            },
        );
        assert_eq!(transport.category.as_str(), "network");
        assert!(transport.recoverable);
        assert_eq!(transport.message, "Transport error after 4 attempt(s): timeout");
    }

    #[test]
    fn test_credential_and_storage_errors_are_classified() {
        let missing = AccountError::credential("a", &CredentialError::UnknownAccount("a".into()));
        assert_eq!(missing.category, ErrorCategory::Credential);
        assert!(!missing.recoverable);

        let poisoned = AccountError::storage("a", &StorageError::LockPoisoned);
        assert_eq!(poisoned.category, ErrorCategory::Storage);
        assert!(!poisoned.recoverable);
    }

    #[test]
    fn test_account_error_serializes_category() {
        let json = serde_json::to_value(error("a")).unwrap();
        assert_eq!(json["category"], "upstream");
        assert_eq!(json["recoverable"], false);
    }
}
