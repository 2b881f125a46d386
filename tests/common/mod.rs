//! Common test utilities

#![allow(dead_code)]

use serde_json::{json, Value};
use wiremock::ResponseTemplate;

use poolsync::config::Config;
use poolsync::credentials::{AccountSpec, Credential, CredentialStore, MapSource};
use poolsync::models::AccountKind;

/// Configuration pointed at a mock server, with pacing and delays disabled
pub fn test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.api.base_url = base_url.to_string();
    config.api.request_timeout_secs = 5;
    config.api.max_retries = 2;
    config.api.retry_base_delay_ms = 1;
    config.api.retry_max_delay_ms = 5;
    config.api.min_interval_ms = 0;
    config.api.page_delay_ms = 0;
    config.api.page_size = 2;
    config
}

/// Account name for a 1-based index: `Acct01`, `Acct02`, ...
pub fn account_name(index: usize) -> String {
    format!("Acct{index:02}")
}

/// Subject id sent as `userId` for an account index
pub fn subject_id(index: usize) -> String {
    format!("sub-{index:02}")
}

/// Form-body fragment identifying an account's requests
pub fn user_fragment(index: usize) -> String {
    format!("userId={}", subject_id(index))
}

/// Registry of `count` sub-accounts, all with resolvable credentials
pub fn credential_store(count: usize) -> CredentialStore {
    let mut source = MapSource::new();
    let mut accounts = Vec::with_capacity(count);
    for index in 1..=count {
        let prefix = format!("ACCT{index:02}");
        source = source.with_account(
            &prefix,
            &format!("key-{index:02}"),
            &format!("secret-{index:02}"),
            &subject_id(index),
        );
        accounts.push(AccountSpec::new(account_name(index), prefix, AccountKind::Sub));
    }
    CredentialStore::new(accounts, source)
}

pub fn credential() -> Credential {
    Credential {
        api_key: "key-01".to_string(),
        api_secret: "secret-01".to_string(),
        subject_id: subject_id(1),
    }
}

/// Successful envelope around `data`
pub fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": 0,
        "message": "ok",
        "data": data,
    }))
}

/// Application error envelope
pub fn app_error(code: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": code,
        "message": message,
    }))
}

pub fn balance_data() -> Value {
    json!({
        "earn24Hours": "0.00123",
        "earnTotal": "1.5",
        "paidOut": "1.2",
        "balance": "0.3",
        "settleTime": "2024-05-01"
    })
}

pub fn hashrate_data(total_workers: u32, active_workers: u32) -> Value {
    json!({
        "last10m": "120.5 TH/s",
        "last1h": "118 TH/s",
        "last1d": "119 TH/s",
        "totalWorkers": total_workers,
        "activeWorkers": active_workers
    })
}

/// One page of worker rows in the `result.rows` shape
pub fn worker_page(names: &[&str], total_page: u32, total_record: u64) -> Value {
    let rows: Vec<Value> = names
        .iter()
        .map(|name| {
            json!({
                "workerName": name,
                "workerStatus": 1,
                "hashrate1h": "10 TH/s",
                "hashrate1d": "9.5 TH/s",
                "rejectRate": "0.1%"
            })
        })
        .collect();
    json!({
        "result": {
            "rows": rows,
            "totalPage": total_page,
            "totalRecord": total_record
        }
    })
}
