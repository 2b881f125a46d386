//! In-memory storage backend
//!
//! Useful for testing without a database: records are kept in vectors and
//! can be inspected, and any gateway operation can be made to fail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::{ProblemCriteria, StorageGateway, StorageStats, Table};
use crate::models::{
    AccountKind, AccountOverviewRecord, ApiCallRecord, BalanceRecord, HashrateRecord,
    PaymentRecord, RawResponseRecord, WorkerRecord,
};
use crate::utils::error::{StorageError, StorageResult};

/// Gateway operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    UpsertAccount,
    InsertBalance,
    InsertHashrate,
    InsertWorkers,
    InsertOverview,
    InsertPayment,
    LogApiCall,
    InsertRawResponse,
    ProblemAccounts,
    Cleanup(Table),
}

#[derive(Default)]
struct Tables {
    accounts: HashMap<String, (i64, AccountKind, String)>,
    balances: Vec<BalanceRecord>,
    hashrates: Vec<HashrateRecord>,
    workers: Vec<WorkerRecord>,
    overviews: Vec<AccountOverviewRecord>,
    payments: Vec<PaymentRecord>,
    api_calls: Vec<ApiCallRecord>,
    raw_responses: Vec<RawResponseRecord>,
}

/// In-memory implementation of [`StorageGateway`]
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
    failures: RwLock<HashSet<FailPoint>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `point` fail until [`MemoryStorage::recover`] is called
    pub fn fail(&self, point: FailPoint) {
        if let Ok(mut failures) = self.failures.write() {
            failures.insert(point);
        }
    }

    pub fn recover(&self, point: FailPoint) {
        if let Ok(mut failures) = self.failures.write() {
            failures.remove(&point);
        }
    }

    fn check(&self, point: FailPoint) -> StorageResult<()> {
        let failures = self.failures.read().map_err(|_| StorageError::LockPoisoned)?;
        if failures.contains(&point) {
            return Err(StorageError::Backend(format!("injected failure: {point:?}")));
        }
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        f(&tables)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> StorageResult<T> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(f(&mut tables))
    }

    pub fn balances(&self) -> Vec<BalanceRecord> {
        self.read(|t| t.balances.clone())
    }

    pub fn hashrates(&self) -> Vec<HashrateRecord> {
        self.read(|t| t.hashrates.clone())
    }

    pub fn workers(&self) -> Vec<WorkerRecord> {
        self.read(|t| t.workers.clone())
    }

    pub fn overviews(&self) -> Vec<AccountOverviewRecord> {
        self.read(|t| t.overviews.clone())
    }

    pub fn payments(&self) -> Vec<PaymentRecord> {
        self.read(|t| t.payments.clone())
    }

    pub fn api_calls(&self) -> Vec<ApiCallRecord> {
        self.read(|t| t.api_calls.clone())
    }

    pub fn raw_responses(&self) -> Vec<RawResponseRecord> {
        self.read(|t| t.raw_responses.clone())
    }

    pub fn account_id(&self, name: &str) -> Option<i64> {
        self.read(|t| t.accounts.get(name).map(|(id, _, _)| *id))
    }
}

/// Latest record per account observed at or after `since`
fn latest_per_account<'a, T>(
    records: &'a [T],
    since: DateTime<Utc>,
    key: impl Fn(&T) -> (&str, DateTime<Utc>),
) -> HashMap<&'a str, &'a T> {
    let mut latest: HashMap<&str, &T> = HashMap::new();
    for record in records {
        let (account, at) = key(record);
        if at < since {
            continue;
        }
        let newer = latest.get(account).map_or(true, |current| key(current).1 <= at);
        if newer {
            latest.insert(account, record);
        }
    }
    latest
}

fn retain_newer<T>(
    records: &mut Vec<T>,
    cutoff: DateTime<Utc>,
    at: impl Fn(&T) -> DateTime<Utc>,
) -> usize {
    let before = records.len();
    records.retain(|r| at(r) >= cutoff);
    before - records.len()
}

#[async_trait]
impl StorageGateway for MemoryStorage {
    async fn upsert_account(
        &self,
        name: &str,
        kind: AccountKind,
        subject_id: &str,
    ) -> StorageResult<i64> {
        self.check(FailPoint::UpsertAccount)?;
        self.write(|t| {
            let next_id = t.accounts.len() as i64 + 1;
            let entry = t
                .accounts
                .entry(name.to_string())
                .or_insert((next_id, kind, subject_id.to_string()));
            entry.1 = kind;
            entry.2 = subject_id.to_string();
            entry.0
        })
    }

    async fn insert_balance(&self, record: &BalanceRecord) -> StorageResult<()> {
        self.check(FailPoint::InsertBalance)?;
        self.write(|t| t.balances.push(record.clone()))
    }

    async fn insert_hashrate(&self, record: &HashrateRecord) -> StorageResult<()> {
        self.check(FailPoint::InsertHashrate)?;
        self.write(|t| t.hashrates.push(record.clone()))
    }

    async fn insert_worker_batch(&self, records: &[WorkerRecord]) -> StorageResult<usize> {
        self.check(FailPoint::InsertWorkers)?;
        self.write(|t| {
            t.workers.extend_from_slice(records);
            records.len()
        })
    }

    async fn insert_account_overview(&self, record: &AccountOverviewRecord) -> StorageResult<()> {
        self.check(FailPoint::InsertOverview)?;
        self.write(|t| t.overviews.push(record.clone()))
    }

    async fn insert_payment(&self, record: &PaymentRecord) -> StorageResult<()> {
        self.check(FailPoint::InsertPayment)?;
        self.write(|t| t.payments.push(record.clone()))
    }

    async fn log_api_call(&self, record: &ApiCallRecord) -> StorageResult<()> {
        self.check(FailPoint::LogApiCall)?;
        self.write(|t| t.api_calls.push(record.clone()))
    }

    async fn insert_raw_response(&self, record: &RawResponseRecord) -> StorageResult<()> {
        self.check(FailPoint::InsertRawResponse)?;
        self.write(|t| t.raw_responses.push(record.clone()))
    }

    async fn problem_accounts(&self, criteria: &ProblemCriteria) -> StorageResult<Vec<String>> {
        self.check(FailPoint::ProblemAccounts)?;

        let mut problems: Vec<String> = self.read(|t| {
            let mut found = HashSet::new();

            let hashrates = latest_per_account(&t.hashrates, criteria.since, |r| {
                (r.account.as_str(), r.observed_at)
            });
            for (account, record) in hashrates {
                if record.is_offline() || (criteria.zero_hashrate && record.last_1h == 0) {
                    found.insert(account.to_string());
                }
            }

            if criteria.inactive_workers {
                let overviews = latest_per_account(&t.overviews, criteria.since, |r| {
                    (r.account.as_str(), r.observed_at)
                });
                for (account, record) in overviews {
                    if record.summary.inactive > 0 {
                        found.insert(account.to_string());
                    }
                }
            }

            found.into_iter().collect()
        });

        problems.sort();
        problems.truncate(criteria.limit);
        Ok(problems)
    }

    async fn cleanup_older_than(
        &self,
        table: Table,
        age: chrono::Duration,
    ) -> StorageResult<usize> {
        self.check(FailPoint::Cleanup(table))?;
        let cutoff = Utc::now() - age;
        self.write(|t| match table {
            Table::Balances => retain_newer(&mut t.balances, cutoff, |r| r.observed_at),
            Table::Hashrates => retain_newer(&mut t.hashrates, cutoff, |r| r.observed_at),
            Table::Workers => retain_newer(&mut t.workers, cutoff, |r| r.observed_at),
            Table::AccountOverviews => retain_newer(&mut t.overviews, cutoff, |r| r.observed_at),
            Table::Payments => retain_newer(&mut t.payments, cutoff, |r| r.observed_at),
            Table::ApiCalls => retain_newer(&mut t.api_calls, cutoff, |r| r.called_at),
            Table::RawResponses => retain_newer(&mut t.raw_responses, cutoff, |r| r.captured_at),
        })
    }

    async fn stats(&self) -> StorageResult<StorageStats> {
        Ok(self.read(|t| StorageStats {
            accounts: t.accounts.len(),
            balances: t.balances.len(),
            hashrates: t.hashrates.len(),
            workers: t.workers.len(),
            account_overviews: t.overviews.len(),
            payments: t.payments.len(),
            api_calls: t.api_calls.len(),
            raw_responses: t.raw_responses.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(age_days: i64) -> PaymentRecord {
        PaymentRecord {
            account: "Acme".to_string(),
            coin: "BTC".to_string(),
            payment_type: "payout".to_string(),
            amount: 0.01,
            tx_id: None,
            address: None,
            paid_at: None,
            observed_at: Utc::now() - chrono::Duration::days(age_days),
        }
    }

    #[tokio::test]
    async fn test_fail_point_and_recover() {
        let storage = MemoryStorage::new();
        storage.fail(FailPoint::InsertPayment);
        assert!(matches!(
            storage.insert_payment(&payment(0)).await,
            Err(StorageError::Backend(_))
        ));

        storage.recover(FailPoint::InsertPayment);
        storage.insert_payment(&payment(0)).await.unwrap();
        assert_eq!(storage.payments().len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_is_per_table() {
        let storage = MemoryStorage::new();
        storage.insert_payment(&payment(10)).await.unwrap();
        storage.insert_payment(&payment(0)).await.unwrap();

        storage.fail(FailPoint::Cleanup(Table::Workers));
        assert!(storage
            .cleanup_older_than(Table::Workers, chrono::Duration::days(1))
            .await
            .is_err());

        let deleted = storage
            .cleanup_older_than(Table::Payments, chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(storage.stats().await.unwrap().payments, 1);
    }

    #[tokio::test]
    async fn test_upsert_keeps_id() {
        let storage = MemoryStorage::new();
        let a = storage.upsert_account("A", AccountKind::Sub, "1").await.unwrap();
        let b = storage.upsert_account("B", AccountKind::Sub, "2").await.unwrap();
        let a_again = storage.upsert_account("A", AccountKind::Primary, "1").await.unwrap();
        assert_eq!(a, a_again);
        assert_ne!(a, b);
        assert_eq!(storage.account_id("B"), Some(b));
    }
}
