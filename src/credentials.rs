//! Account registry and credential resolution
//!
//! Each account maps to three configuration values: `{PREFIX}_ACCESS_KEY`,
//! `{PREFIX}_SECRET_KEY` and `{PREFIX}_USER_ID`. Values are read from a
//! [`CredentialSource`] once per run and never written anywhere.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::AccountKind;
use crate::utils::error::CredentialError;
use crate::utils::mask_secret;

/// Sub-accounts of the production deployment, as (name, variable prefix)
const DEFAULT_SUB_ACCOUNTS: &[(&str, &str)] = &[
    ("POWDigital3", "POWDIGITAL3"),
    ("PNGMiningEth", "PNGMININGETH"),
    ("PedroEth", "PEDROETH"),
    ("KennDunk", "KENNDUNK"),
    ("YZMining", "YZMINING"),
    ("SVJMining", "SVJMINING"),
    ("ZTuneMining", "ZTUNEMINING"),
    ("BMasterMining", "BMASTERMINING"),
    ("Allin3", "ALLIN3"),
    ("Mack81", "MACK81"),
    ("CanKann2", "CANKANN2"),
    ("PedroMining", "PEDROMINING"),
    ("VanMining", "VANMINING"),
    ("LasVegasMining", "LASVEGASMINING"),
    ("CanKann", "CANKANN"),
    ("PNGMining", "PNGMINING"),
    ("Rarcoa", "RARCOA"),
    ("Soltero", "SOLTERO"),
    ("BillMiningBR", "BILLMININGBR"),
    ("POWDigital2", "POWDIGITAL2"),
    ("BlackDawn", "BLACKDAWN"),
    ("Manggornmoo", "MANGGORNMOO"),
    ("Lasvegasmining2", "LASVEGASMINING2"),
    ("50Shades", "FIFTYSHADES"),
    ("NsxR", "NSXR"),
    ("BlockwareSA", "BLOCKWARESA"),
    ("RarcoaSA", "RARCOASA"),
    ("VanminingSA", "VANMININGSA"),
    ("BillminingSA", "BILLMININGSA"),
    ("Allin2", "ALLIN2"),
    ("TylerDSA", "TYLERDSA"),
    ("GoldenDawn", "GOLDENDAWN"),
    ("POWDigital", "POWDIGITAL"),
];

/// Name and variable prefix of the optional primary account
const PRIMARY_ACCOUNT: (&str, &str) = ("Main", "ANTPOOL");

/// Registry entry describing where an account's credentials live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSpec {
    /// Unique account identifier
    pub name: String,

    /// Prefix of the three configuration variables
    pub env_prefix: String,

    /// Primary or sub-account
    #[serde(default)]
    pub kind: AccountKind,
}

impl AccountSpec {
    pub fn new(name: impl Into<String>, env_prefix: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            name: name.into(),
            env_prefix: env_prefix.into(),
            kind,
        }
    }

    pub fn key_var(&self) -> String {
        format!("{}_ACCESS_KEY", self.env_prefix)
    }

    pub fn secret_var(&self) -> String {
        format!("{}_SECRET_KEY", self.env_prefix)
    }

    pub fn subject_var(&self) -> String {
        format!("{}_USER_ID", self.env_prefix)
    }
}

/// Immutable credential triple for one account
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub api_key: String,
    pub api_secret: String,
    pub subject_id: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &mask_secret(&self.api_key))
            .field("api_secret", &"<redacted>")
            .field("subject_id", &self.subject_id)
            .finish()
    }
}

/// Lookup of raw configuration values
pub trait CredentialSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads credentials from the process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSource;

impl CredentialSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// In-memory source, mainly for tests and embedding
#[derive(Debug, Default, Clone)]
pub struct MapSource {
    values: HashMap<String, String>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the full credential triple for an account prefix
    pub fn with_account(mut self, prefix: &str, key: &str, secret: &str, subject: &str) -> Self {
        self.insert(format!("{prefix}_ACCESS_KEY"), key);
        self.insert(format!("{prefix}_SECRET_KEY"), secret);
        self.insert(format!("{prefix}_USER_ID"), subject);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl CredentialSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Maps account identifiers to credentials
pub struct CredentialStore {
    accounts: Vec<AccountSpec>,
    source: Box<dyn CredentialSource>,
}

impl CredentialStore {
    pub fn new(accounts: Vec<AccountSpec>, source: impl CredentialSource + 'static) -> Self {
        Self {
            accounts,
            source: Box::new(source),
        }
    }

    /// Built-in registry: the sub-accounts, plus the primary account when its
    /// access key is configured
    pub fn default_registry(source: &dyn CredentialSource) -> Vec<AccountSpec> {
        let mut accounts = Vec::with_capacity(DEFAULT_SUB_ACCOUNTS.len() + 1);

        let (primary_name, primary_prefix) = PRIMARY_ACCOUNT;
        let primary = AccountSpec::new(primary_name, primary_prefix, AccountKind::Primary);
        if source.get(&primary.key_var()).is_some_and(|v| !v.is_empty()) {
            accounts.push(primary);
        }

        accounts.extend(
            DEFAULT_SUB_ACCOUNTS
                .iter()
                .map(|(name, prefix)| AccountSpec::new(*name, *prefix, AccountKind::Sub)),
        );
        accounts
    }

    /// Store backed by the process environment, using the configured
    /// registry or the built-in one
    pub fn from_env(registry: Option<Vec<AccountSpec>>) -> Self {
        let accounts = registry.unwrap_or_else(|| Self::default_registry(&EnvSource));
        Self::new(accounts, EnvSource)
    }

    /// All registered accounts, in registry order
    pub fn accounts(&self) -> &[AccountSpec] {
        &self.accounts
    }

    pub fn account_names(&self) -> Vec<String> {
        self.accounts.iter().map(|a| a.name.clone()).collect()
    }

    pub fn spec(&self, name: &str) -> Option<&AccountSpec> {
        self.accounts.iter().find(|a| a.name == name)
    }

    /// Resolve the credential triple for an account
    ///
    /// # Errors
    ///
    /// `UnknownAccount` for names outside the registry, `Missing` naming every
    /// absent (or empty) variable otherwise.
    pub fn resolve(&self, name: &str) -> Result<Credential, CredentialError> {
        let spec = self
            .spec(name)
            .ok_or_else(|| CredentialError::UnknownAccount(name.to_string()))?;

        let lookup = |var: String| -> (String, Option<String>) {
            let value = self.source.get(&var).filter(|v| !v.trim().is_empty());
            (var, value)
        };

        let (key_var, api_key) = lookup(spec.key_var());
        let (secret_var, api_secret) = lookup(spec.secret_var());
        let (subject_var, subject_id) = lookup(spec.subject_var());

        match (api_key, api_secret, subject_id) {
            (Some(api_key), Some(api_secret), Some(subject_id)) => Ok(Credential {
                api_key,
                api_secret,
                subject_id,
            }),
            (api_key, api_secret, subject_id) => {
                let missing = [
                    (key_var, api_key.is_none()),
                    (secret_var, api_secret.is_none()),
                    (subject_var, subject_id.is_none()),
                ]
                .into_iter()
                .filter_map(|(var, absent)| absent.then_some(var))
                .collect();

                Err(CredentialError::Missing {
                    account: spec.name.clone(),
                    missing,
                })
            }
        }
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("accounts", &self.accounts.len())
            .finish()
    }
}
