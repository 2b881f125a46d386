//! SQLite storage backend
//!
//! Uses `Mutex` to ensure thread-safety for the SQLite connection. Every
//! statement is short, so the lock is taken inside the async methods.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{timestamp, ProblemCriteria, StorageGateway, StorageStats, Table};
use crate::models::{
    AccountKind, AccountOverviewRecord, ApiCallRecord, BalanceRecord, HashrateRecord,
    PaymentRecord, RawResponseRecord, WorkerRecord,
};
use crate::utils::error::{StorageError, StorageResult};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        kind TEXT NOT NULL,
        subject_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS account_balances (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account TEXT NOT NULL,
        coin TEXT NOT NULL,
        earn_24h REAL NOT NULL,
        earn_total REAL NOT NULL,
        paid_out REAL NOT NULL,
        balance REAL NOT NULL,
        settle_time TEXT,
        observed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_balances_observed
        ON account_balances(observed_at);

    CREATE TABLE IF NOT EXISTS hashrates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account TEXT NOT NULL,
        coin TEXT NOT NULL,
        last_10m INTEGER NOT NULL,
        last_1h INTEGER NOT NULL,
        last_1d INTEGER NOT NULL,
        prev_10m INTEGER NOT NULL,
        prev_1h INTEGER NOT NULL,
        prev_1d INTEGER NOT NULL,
        accepted_shares INTEGER NOT NULL,
        stale_shares INTEGER NOT NULL,
        duplicate_shares INTEGER NOT NULL,
        other_shares INTEGER NOT NULL,
        total_workers INTEGER NOT NULL,
        active_workers INTEGER NOT NULL,
        observed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_hashrates_account_observed
        ON hashrates(account, observed_at);

    CREATE TABLE IF NOT EXISTS workers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account TEXT NOT NULL,
        name TEXT NOT NULL,
        status TEXT NOT NULL,
        hashrate_1h INTEGER NOT NULL,
        hashrate_24h INTEGER NOT NULL,
        reject_rate REAL NOT NULL,
        last_share_time TEXT,
        observed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_workers_account_observed
        ON workers(account, observed_at);

    CREATE TABLE IF NOT EXISTS account_overviews (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account TEXT NOT NULL,
        coin TEXT NOT NULL,
        source TEXT NOT NULL,
        total_workers INTEGER NOT NULL,
        active_workers INTEGER NOT NULL,
        inactive_workers INTEGER NOT NULL,
        invalid_workers INTEGER NOT NULL,
        hashrate_1h INTEGER NOT NULL,
        hashrate_24h INTEGER NOT NULL,
        observed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_overviews_account_observed
        ON account_overviews(account, observed_at);

    CREATE TABLE IF NOT EXISTS payments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account TEXT NOT NULL,
        coin TEXT NOT NULL,
        payment_type TEXT NOT NULL,
        amount REAL NOT NULL,
        tx_id TEXT,
        address TEXT,
        paid_at TEXT,
        observed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_payments_observed
        ON payments(observed_at);

    CREATE TABLE IF NOT EXISTS api_call_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        endpoint TEXT NOT NULL,
        account TEXT,
        success INTEGER NOT NULL,
        duration_ms INTEGER NOT NULL,
        error_kind TEXT,
        called_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_api_call_logs_called
        ON api_call_logs(called_at);

    CREATE TABLE IF NOT EXISTS raw_responses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account TEXT NOT NULL,
        endpoint TEXT NOT NULL,
        coin TEXT NOT NULL,
        reason TEXT NOT NULL,
        row_count INTEGER NOT NULL,
        payload TEXT NOT NULL,
        captured_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_raw_responses_captured
        ON raw_responses(captured_at);
"#;

const PROBLEM_ACCOUNTS_SQL: &str = r#"
    SELECT account FROM (
        SELECT h.account AS account
        FROM hashrates h
        JOIN (
            SELECT account, MAX(observed_at) AS latest
            FROM hashrates
            WHERE observed_at >= ?1
            GROUP BY account
        ) l ON h.account = l.account AND h.observed_at = l.latest
        WHERE (h.total_workers > 0 AND h.active_workers = 0)
           OR (?2 AND h.last_1h = 0)

        UNION

        SELECT o.account AS account
        FROM account_overviews o
        JOIN (
            SELECT account, MAX(observed_at) AS latest
            FROM account_overviews
            WHERE observed_at >= ?1
            GROUP BY account
        ) l ON o.account = l.account AND o.observed_at = l.latest
        WHERE ?3 AND o.inactive_workers > 0
    )
    ORDER BY account
    LIMIT ?4
"#;

/// Saturating conversion for SQLite's signed integers
fn int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// SQLite implementation of [`StorageGateway`]
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) a database file
    pub fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite storage initialized");
        Ok(storage)
    }

    /// Create in-memory storage (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> StorageResult<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn count(conn: &Connection, table: &str) -> StorageResult<usize> {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(n.max(0) as usize)
    }
}

#[async_trait]
impl StorageGateway for SqliteStorage {
    async fn upsert_account(
        &self,
        name: &str,
        kind: AccountKind,
        subject_id: &str,
    ) -> StorageResult<i64> {
        let conn = self.conn()?;
        let now = timestamp(&Utc::now());
        conn.execute(
            "INSERT INTO accounts (name, kind, subject_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(name) DO UPDATE SET
                kind = excluded.kind,
                subject_id = excluded.subject_id,
                updated_at = excluded.updated_at",
            params![name, kind.as_str(), subject_id, now],
        )?;

        let id = conn.query_row(
            "SELECT id FROM accounts WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    async fn insert_balance(&self, record: &BalanceRecord) -> StorageResult<()> {
        self.conn()?.execute(
            "INSERT INTO account_balances
                (account, coin, earn_24h, earn_total, paid_out, balance, settle_time, observed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.account,
                record.coin,
                record.earn_24h,
                record.earn_total,
                record.paid_out,
                record.balance,
                record.settle_time,
                timestamp(&record.observed_at),
            ],
        )?;
        Ok(())
    }

    async fn insert_hashrate(&self, record: &HashrateRecord) -> StorageResult<()> {
        self.conn()?.execute(
            "INSERT INTO hashrates
                (account, coin, last_10m, last_1h, last_1d, prev_10m, prev_1h, prev_1d,
                 accepted_shares, stale_shares, duplicate_shares, other_shares,
                 total_workers, active_workers, observed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                record.account,
                record.coin,
                int(record.last_10m),
                int(record.last_1h),
                int(record.last_1d),
                int(record.prev_10m),
                int(record.prev_1h),
                int(record.prev_1d),
                int(record.accepted_shares),
                int(record.stale_shares),
                int(record.duplicate_shares),
                int(record.other_shares),
                record.total_workers,
                record.active_workers,
                timestamp(&record.observed_at),
            ],
        )?;
        Ok(())
    }

    async fn insert_worker_batch(&self, records: &[WorkerRecord]) -> StorageResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO workers
                    (account, name, status, hashrate_1h, hashrate_24h, reject_rate,
                     last_share_time, observed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.account,
                    record.name,
                    record.status.as_str(),
                    int(record.hashrate_1h),
                    int(record.hashrate_24h),
                    record.reject_rate_percent,
                    record.last_share_time.as_ref().map(timestamp),
                    timestamp(&record.observed_at),
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    async fn insert_account_overview(&self, record: &AccountOverviewRecord) -> StorageResult<()> {
        self.conn()?.execute(
            "INSERT INTO account_overviews
                (account, coin, source, total_workers, active_workers, inactive_workers,
                 invalid_workers, hashrate_1h, hashrate_24h, observed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.account,
                record.coin,
                record.source.as_str(),
                int(record.summary.total as u64),
                int(record.summary.active as u64),
                int(record.summary.inactive as u64),
                int(record.summary.invalid as u64),
                int(record.hashrate_1h),
                int(record.hashrate_24h),
                timestamp(&record.observed_at),
            ],
        )?;
        Ok(())
    }

    async fn insert_payment(&self, record: &PaymentRecord) -> StorageResult<()> {
        self.conn()?.execute(
            "INSERT INTO payments
                (account, coin, payment_type, amount, tx_id, address, paid_at, observed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.account,
                record.coin,
                record.payment_type,
                record.amount,
                record.tx_id,
                record.address,
                record.paid_at.as_ref().map(timestamp),
                timestamp(&record.observed_at),
            ],
        )?;
        Ok(())
    }

    async fn log_api_call(&self, record: &ApiCallRecord) -> StorageResult<()> {
        self.conn()?.execute(
            "INSERT INTO api_call_logs
                (endpoint, account, success, duration_ms, error_kind, called_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.endpoint,
                record.account,
                record.success,
                int(record.duration_ms),
                record.error_kind,
                timestamp(&record.called_at),
            ],
        )?;
        Ok(())
    }

    async fn insert_raw_response(&self, record: &RawResponseRecord) -> StorageResult<()> {
        self.conn()?.execute(
            "INSERT INTO raw_responses
                (account, endpoint, coin, reason, row_count, payload, captured_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.account,
                record.endpoint,
                record.coin,
                record.reason.as_str(),
                int(record.row_count as u64),
                record.payload,
                timestamp(&record.captured_at),
            ],
        )?;
        Ok(())
    }

    async fn problem_accounts(&self, criteria: &ProblemCriteria) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(PROBLEM_ACCOUNTS_SQL)?;
        let accounts = stmt
            .query_map(
                params![
                    timestamp(&criteria.since),
                    criteria.zero_hashrate,
                    criteria.inactive_workers,
                    int(criteria.limit as u64),
                ],
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    async fn cleanup_older_than(
        &self,
        table: Table,
        age: chrono::Duration,
    ) -> StorageResult<usize> {
        let cutoff = timestamp(&(Utc::now() - age));
        let sql = format!(
            "DELETE FROM {} WHERE {} < ?1",
            table.as_str(),
            table.timestamp_column()
        );
        let deleted = self.conn()?.execute(&sql, params![cutoff])?;
        Ok(deleted)
    }

    async fn stats(&self) -> StorageResult<StorageStats> {
        let conn = self.conn()?;
        Ok(StorageStats {
            accounts: Self::count(&conn, "accounts")?,
            balances: Self::count(&conn, Table::Balances.as_str())?,
            hashrates: Self::count(&conn, Table::Hashrates.as_str())?,
            workers: Self::count(&conn, Table::Workers.as_str())?,
            account_overviews: Self::count(&conn, Table::AccountOverviews.as_str())?,
            payments: Self::count(&conn, Table::Payments.as_str())?,
            api_calls: Self::count(&conn, Table::ApiCalls.as_str())?,
            raw_responses: Self::count(&conn, Table::RawResponses.as_str())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountSummary, OverviewSource, WorkerStatus};
    use chrono::Duration;

    fn hashrate(account: &str, total: u32, active: u32, last_1h: u64, age_mins: i64) -> HashrateRecord {
        HashrateRecord {
            account: account.to_string(),
            coin: "BTC".to_string(),
            last_10m: last_1h,
            last_1h,
            last_1d: last_1h,
            prev_10m: 0,
            prev_1h: 0,
            prev_1d: 0,
            accepted_shares: 0,
            stale_shares: 0,
            duplicate_shares: 0,
            other_shares: 0,
            total_workers: total,
            active_workers: active,
            observed_at: Utc::now() - Duration::minutes(age_mins),
        }
    }

    fn criteria() -> ProblemCriteria {
        ProblemCriteria {
            since: Utc::now() - Duration::hours(3),
            limit: 10,
            zero_hashrate: true,
            inactive_workers: true,
        }
    }

    #[tokio::test]
    async fn test_upsert_account_is_stable() {
        let storage = SqliteStorage::in_memory().unwrap();
        let first = storage
            .upsert_account("Acme", AccountKind::Sub, "acme-1")
            .await
            .unwrap();
        let again = storage
            .upsert_account("Acme", AccountKind::Sub, "acme-2")
            .await
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(storage.stats().await.unwrap().accounts, 1);
    }

    #[tokio::test]
    async fn test_problem_accounts_use_latest_snapshot() {
        let storage = SqliteStorage::in_memory().unwrap();

        // Offline an hour ago, healthy now
        storage.insert_hashrate(&hashrate("Recovered", 4, 0, 0, 60)).await.unwrap();
        storage.insert_hashrate(&hashrate("Recovered", 4, 4, 100, 5)).await.unwrap();
        // Offline now
        storage.insert_hashrate(&hashrate("Acme", 12, 0, 0, 5)).await.unwrap();
        // Offline, but outside the lookback
        storage.insert_hashrate(&hashrate("Stale", 2, 0, 0, 600)).await.unwrap();
        // Healthy
        storage.insert_hashrate(&hashrate("Fine", 3, 3, 50, 5)).await.unwrap();

        storage
            .insert_account_overview(&AccountOverviewRecord {
                account: "Partial".to_string(),
                coin: "BTC".to_string(),
                source: OverviewSource::WorkerSummary,
                summary: AccountSummary {
                    total: 5,
                    active: 3,
                    inactive: 2,
                    invalid: 0,
                },
                hashrate_1h: 10,
                hashrate_24h: 10,
                observed_at: Utc::now(),
            })
            .await
            .unwrap();

        let problems = storage.problem_accounts(&criteria()).await.unwrap();
        assert_eq!(problems, vec!["Acme".to_string(), "Partial".to_string()]);

        let mut narrow = criteria();
        narrow.inactive_workers = false;
        narrow.limit = 5;
        let problems = storage.problem_accounts(&narrow).await.unwrap();
        assert_eq!(problems, vec!["Acme".to_string()]);
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_old_rows() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.insert_hashrate(&hashrate("Old", 1, 1, 1, 60 * 24 * 5)).await.unwrap();
        storage.insert_hashrate(&hashrate("New", 1, 1, 1, 1)).await.unwrap();

        let deleted = storage
            .cleanup_older_than(Table::Hashrates, Duration::days(3))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(storage.stats().await.unwrap().hashrates, 1);
    }

    #[tokio::test]
    async fn test_worker_batch_insert() {
        let storage = SqliteStorage::in_memory().unwrap();
        let now = Utc::now();
        let workers: Vec<_> = (0..3)
            .map(|i| WorkerRecord {
                account: "Acme".to_string(),
                name: format!("rig-{i}"),
                status: WorkerStatus::Online,
                hashrate_1h: 1,
                hashrate_24h: 1,
                reject_rate_percent: 0.0,
                last_share_time: Some(now),
                observed_at: now,
            })
            .collect();

        assert_eq!(storage.insert_worker_batch(&workers).await.unwrap(), 3);
        assert_eq!(storage.insert_worker_batch(&[]).await.unwrap(), 0);
        assert_eq!(storage.stats().await.unwrap().workers, 3);
    }

    #[tokio::test]
    async fn test_raw_responses_follow_retention() {
        let storage = SqliteStorage::in_memory().unwrap();
        let raw = |age_days: i64| RawResponseRecord {
            account: "Acme".to_string(),
            endpoint: "worker_list".to_string(),
            coin: "BTC".to_string(),
            reason: crate::models::CaptureReason::Unparsed,
            row_count: 1,
            payload: r#"[{"hashrate1h":"1 TH/s"}]"#.to_string(),
            captured_at: Utc::now() - Duration::days(age_days),
        };

        storage.insert_raw_response(&raw(10)).await.unwrap();
        storage.insert_raw_response(&raw(0)).await.unwrap();
        assert_eq!(storage.stats().await.unwrap().raw_responses, 2);

        let deleted = storage
            .cleanup_older_than(Table::RawResponses, Duration::days(7))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(storage.stats().await.unwrap().rows(Table::RawResponses), 1);
    }
}
