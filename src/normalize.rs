//! Response normalization
//!
//! Converts the heterogeneous upstream field formats into canonical typed
//! values. Every function here is pure and total: malformed input yields a
//! zero-equivalent value (or `None`) and the caller decides whether to count
//! it as invalid.
//!
//! Timestamp units are fixed per endpoint: worker `lastShareTime` values and
//! numeric payment timestamps are seconds since the epoch. Payment rows may
//! also carry `YYYY-MM-DD HH:MM:SS` strings, read as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::models::{
    AccountOverviewRecord, AccountSummary, BalanceRecord, HashrateRecord, OverviewSource,
    PaymentRecord, WorkerRecord, WorkerStatus,
};

/// Unit of a numeric epoch timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochUnit {
    Seconds,
    Millis,
}

fn hashrate_pattern() -> &'static Regex {
    static HASHRATE_RE: OnceLock<Regex> = OnceLock::new();
    HASHRATE_RE.get_or_init(|| {
        Regex::new(r"^\s*([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)\s*(TH/s|GH/s|MH/s|H/s)?\s*$")
            .expect("Invalid regex pattern")
    })
}

fn to_hashes(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

/// Parse a hashrate string such as `"12.5 TH/s"` into hashes per second
///
/// Suffixes are matched case-sensitively. A bare number is already H/s.
/// Empty, negative or unparseable input yields 0.
pub fn parse_hashrate(input: &str) -> u64 {
    let Some(caps) = hashrate_pattern().captures(input) else {
        return 0;
    };

    let Ok(number) = caps[1].parse::<f64>() else {
        return 0;
    };

    let scale = match caps.get(2).map(|m| m.as_str()) {
        Some("TH/s") => 1e12,
        Some("GH/s") => 1e9,
        Some("MH/s") => 1e6,
        _ => 1.0,
    };

    to_hashes(number * scale)
}

/// Hashrate from a JSON value that may be a number or a suffixed string
pub fn hashrate_value(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_f64().map(to_hashes).unwrap_or(0),
        Value::String(s) => parse_hashrate(s),
        _ => 0,
    }
}

/// Parse a percentage string such as `"0.35%"`
pub fn parse_percentage(input: &str) -> f64 {
    let trimmed = input.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    match number.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Percentage from a JSON value that may be a number or a string
pub fn percentage_value(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        Value::String(s) => parse_percentage(s),
        _ => 0.0,
    }
}

/// Parse an epoch timestamp given as an integer or a numeric string
///
/// Null, empty, zero or negative values yield `None`.
pub fn parse_epoch(value: &Value, unit: EpochUnit) -> Option<DateTime<Utc>> {
    let raw = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))?
        }
        _ => return None,
    };

    if raw <= 0 {
        return None;
    }

    match unit {
        EpochUnit::Seconds => DateTime::from_timestamp(raw, 0),
        EpochUnit::Millis => DateTime::from_timestamp_millis(raw),
    }
}

/// Payment timestamps: epoch seconds, or a `YYYY-MM-DD HH:MM:SS` UTC string
pub fn parse_payment_time(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(ts) = parse_epoch(value, EpochUnit::Seconds) {
        return Some(ts);
    }

    let s = value.as_str()?.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Interpret an upstream liveness flag
///
/// `1`/`true`/`"online"`/`"active"` are active; `0`, `2` (the worker-list
/// "offline" code) and their string forms are inactive. Anything else,
/// including `3` ("invalid"), carries no signal.
pub fn active_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) | Some(2) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "online" | "active" => Some(true),
            "0" | "2" | "false" | "offline" | "inactive" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Reconcile the two liveness signals the upstream exposes
///
/// Online when the flag is truthy or a recent share was seen; offline when the
/// flag is explicitly false; unknown otherwise.
pub fn classify_worker_status(active: Option<bool>, recent_share: bool) -> WorkerStatus {
    match active {
        Some(true) => WorkerStatus::Online,
        _ if recent_share => WorkerStatus::Online,
        Some(false) => WorkerStatus::Offline,
        None => WorkerStatus::Unknown,
    }
}

/// First present, non-null field among `names`
fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| obj.get(*name))
        .find(|v| !v.is_null())
}

fn number_value(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

fn number_field(obj: &Map<String, Value>, names: &[&str]) -> f64 {
    field(obj, names).map(number_value).unwrap_or(0.0)
}

fn count_field(obj: &Map<String, Value>, names: &[&str]) -> u64 {
    let v = number_field(obj, names);
    if v > 0.0 {
        v as u64
    } else {
        0
    }
}

fn hashrate_field(obj: &Map<String, Value>, names: &[&str]) -> u64 {
    field(obj, names).map(hashrate_value).unwrap_or(0)
}

fn text_field(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    match field(obj, names)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn empty_map() -> &'static Map<String, Value> {
    static EMPTY: OnceLock<Map<String, Value>> = OnceLock::new();
    EMPTY.get_or_init(Map::new)
}

fn as_object(value: &Value) -> &Map<String, Value> {
    value.as_object().unwrap_or_else(|| empty_map())
}

/// Normalize one worker row
///
/// Returns `None` for rows that are not objects or carry no worker name; the
/// caller counts those as invalid. A share counts as recent when it is no
/// older than `share_freshness` at `observed_at`.
pub fn normalize_worker(
    row: &Value,
    account: &str,
    observed_at: DateTime<Utc>,
    share_freshness: chrono::Duration,
) -> Option<WorkerRecord> {
    let obj = row.as_object()?;
    let name = text_field(obj, &["workerName", "worker_name", "worker", "workerId"])?;

    let last_share_time = field(obj, &["lastShareTime", "last_share_time", "lastShare"])
        .and_then(|v| parse_epoch(v, EpochUnit::Seconds));
    let recent_share = last_share_time.is_some_and(|t| observed_at - t <= share_freshness);

    let flag = field(
        obj,
        &["workerStatus", "worker_status", "status", "active", "isActive"],
    )
    .and_then(active_flag);

    Some(WorkerRecord {
        account: account.to_string(),
        name,
        status: classify_worker_status(flag, recent_share),
        hashrate_1h: hashrate_field(obj, &["hashrate1h", "hashrate_1h", "last1h"]),
        hashrate_24h: hashrate_field(obj, &["hashrate1d", "hashrate_24h", "hashrate24h", "last1d"]),
        reject_rate_percent: field(obj, &["rejectRate", "reject_rate"])
            .map(percentage_value)
            .unwrap_or(0.0),
        last_share_time,
        observed_at,
    })
}

/// Normalize a balance payload (account endpoint)
pub fn normalize_balance(
    data: &Value,
    account: &str,
    coin: &str,
    observed_at: DateTime<Utc>,
) -> BalanceRecord {
    let obj = as_object(data);
    BalanceRecord {
        account: account.to_string(),
        coin: coin.to_string(),
        earn_24h: number_field(obj, &["earn24Hours", "earn24hours", "earn_24_hours"]),
        earn_total: number_field(obj, &["earnTotal", "earn_total"]),
        paid_out: number_field(obj, &["paidOut", "paid_out"]),
        balance: number_field(obj, &["balance"]),
        settle_time: text_field(obj, &["settleTime", "settle_time"]),
        observed_at,
    }
}

/// Normalize a hashrate summary payload (hashrate endpoint)
pub fn normalize_hashrate(
    data: &Value,
    account: &str,
    coin: &str,
    observed_at: DateTime<Utc>,
) -> HashrateRecord {
    let obj = as_object(data);
    HashrateRecord {
        account: account.to_string(),
        coin: coin.to_string(),
        last_10m: hashrate_field(obj, &["last10m", "last_10m"]),
        last_1h: hashrate_field(obj, &["last1h", "last_1h"]),
        last_1d: hashrate_field(obj, &["last1d", "last_1d"]),
        prev_10m: hashrate_field(obj, &["prev10m", "prev_10m"]),
        prev_1h: hashrate_field(obj, &["prev1h", "prev_1h"]),
        prev_1d: hashrate_field(obj, &["prev1d", "prev_1d"]),
        accepted_shares: count_field(obj, &["accepted"]),
        stale_shares: count_field(obj, &["stale"]),
        duplicate_shares: count_field(obj, &["dupelicate", "duplicate"]),
        other_shares: count_field(obj, &["other"]),
        total_workers: count_field(obj, &["totalWorkers", "total_workers", "totalWorkerNum"])
            .min(u64::from(u32::MAX)) as u32,
        active_workers: count_field(obj, &["activeWorkers", "active_workers", "activeWorkerNum"])
            .min(u64::from(u32::MAX)) as u32,
        observed_at,
    }
}

/// Normalize an account overview payload (account overview endpoint)
pub fn normalize_overview(
    data: &Value,
    account: &str,
    coin: &str,
    observed_at: DateTime<Utc>,
) -> AccountOverviewRecord {
    let obj = as_object(data);
    let active = count_field(obj, &["activeWorkerNum", "activeWorkers"]) as usize;
    let inactive = count_field(obj, &["inactiveWorkerNum", "inactiveWorkers"]) as usize;
    let total = match count_field(obj, &["totalWorkerNum", "totalWorkers"]) as usize {
        0 => active + inactive,
        n => n,
    };

    AccountOverviewRecord {
        account: account.to_string(),
        coin: coin.to_string(),
        source: OverviewSource::Upstream,
        summary: AccountSummary {
            total,
            active,
            inactive,
            invalid: count_field(obj, &["invalidWorkerNum", "invalidWorkers"]) as usize,
        },
        hashrate_1h: hashrate_field(obj, &["hsLast1h", "last1h"]),
        hashrate_24h: hashrate_field(obj, &["hsLast1d", "last1d"]),
        observed_at,
    }
}

/// Normalize one payment history row; `None` when the row is not an object
pub fn normalize_payment(
    row: &Value,
    account: &str,
    coin: &str,
    payment_type: &str,
    observed_at: DateTime<Utc>,
) -> Option<PaymentRecord> {
    let obj = row.as_object()?;
    Some(PaymentRecord {
        account: account.to_string(),
        coin: coin.to_string(),
        payment_type: payment_type.to_string(),
        amount: number_field(obj, &["amount", "pplnsAmount", "ppsAmount"]),
        tx_id: text_field(obj, &["txId", "txid", "tx_id"]),
        address: text_field(obj, &["walletAddress", "address"]),
        paid_at: field(obj, &["timestamp", "createDate", "time"]).and_then(parse_payment_time),
        observed_at,
    })
}
