//! Tests for configuration loading and the credential registry

use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

use poolsync::config::Config;
use poolsync::credentials::{CredentialStore, EnvSource, MapSource};
use poolsync::models::AccountKind;
use poolsync::utils::error::CredentialError;

const ENV_KEYS: &[&str] = &[
    "POOLSYNC_BASE_URL",
    "POOLSYNC_BUDGET_CEILING",
    "POOLSYNC_PAGE_SIZE",
    "POOLSYNC_COIN",
    "POOLSYNC_SQLITE_PATH",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_env_overrides_defaults() {
    clear_env();
    std::env::set_var("POOLSYNC_BASE_URL", "http://127.0.0.1:8080/api");
    std::env::set_var("POOLSYNC_BUDGET_CEILING", "120");
    std::env::set_var("POOLSYNC_COIN", "LTC");
    std::env::set_var("POOLSYNC_PAGE_SIZE", "not-a-number");

    let config = Config::from_env().unwrap();
    clear_env();

    assert_eq!(config.api.base_url, "http://127.0.0.1:8080/api");
    assert_eq!(config.budget.ceiling, 120);
    assert_eq!(config.collector.default_coin, "LTC");
    // unparseable values leave the default in place
    assert_eq!(config.api.page_size, 50);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_file_with_account_registry() {
    clear_env();
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[api]
base_url = "http://localhost:9000"
page_size = 25

[collector]
error_threshold = 0.3
problem_fallback_count = 2

[retention]
payments_days = 30

[[accounts]]
name = "Main"
env_prefix = "ANTPOOL"
kind = "primary"

[[accounts]]
name = "Rig01"
env_prefix = "RIG01"
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.api.page_size, 25);
    assert_eq!(config.collector.error_threshold, 0.3);
    assert_eq!(config.collector.problem_fallback_count, 2);
    assert_eq!(config.retention.payments_days, 30);
    assert_eq!(config.budget.ceiling, 580);

    let accounts = config.accounts.unwrap();
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0].kind, AccountKind::Primary);
    assert_eq!(accounts[1].kind, AccountKind::Sub);
}

#[test]
#[serial]
fn test_duplicate_accounts_rejected() {
    clear_env();
    let config: Config = toml::from_str(
        r#"
[[accounts]]
name = "Rig01"
env_prefix = "RIG01"

[[accounts]]
name = "Rig01"
env_prefix = "RIG01B"
"#,
    )
    .unwrap();

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("Rig01"));
}

#[test]
fn test_missing_file_is_an_error() {
    let result = Config::from_file(std::path::Path::new("/nonexistent/poolsync.toml"));
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_env_credentials_resolve() {
    std::env::set_var("CFGTEST_ACCESS_KEY", "ak");
    std::env::set_var("CFGTEST_SECRET_KEY", "sk");
    std::env::set_var("CFGTEST_USER_ID", "");

    let store = CredentialStore::new(
        vec![poolsync::credentials::AccountSpec::new(
            "CfgTest",
            "CFGTEST",
            AccountKind::Sub,
        )],
        EnvSource,
    );
    let err = store.resolve("CfgTest").unwrap_err();

    std::env::set_var("CFGTEST_USER_ID", "subject");
    let credential = store.resolve("CfgTest").unwrap();

    for key in ["CFGTEST_ACCESS_KEY", "CFGTEST_SECRET_KEY", "CFGTEST_USER_ID"] {
        std::env::remove_var(key);
    }

    assert_eq!(
        err,
        CredentialError::Missing {
            account: "CfgTest".to_string(),
            missing: vec!["CFGTEST_USER_ID".to_string()],
        }
    );
    assert_eq!(credential.subject_id, "subject");
    assert!(!format!("{credential:?}").contains("sk"));
}

#[test]
fn test_default_registry_adds_primary_only_when_configured() {
    let without = CredentialStore::default_registry(&MapSource::new());
    assert!(without.iter().all(|a| a.kind == AccountKind::Sub));

    let source = MapSource::new().with_account("ANTPOOL", "key", "secret", "user");
    let with = CredentialStore::default_registry(&source);
    assert_eq!(with.len(), without.len() + 1);
    assert_eq!(with[0].kind, AccountKind::Primary);
}
