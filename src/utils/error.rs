//! Error types for the poolsync collector
//!
//! This module defines the domain error types used throughout the application.

use thiserror::Error;

/// Errors raised while resolving account credentials
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Account is not part of the registry
    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    /// One or more of the three credential values is absent
    #[error("Missing credentials for {account}: {}", missing.join(", "))]
    Missing {
        account: String,
        missing: Vec<String>,
    },
}

/// Errors returned by the signed request client
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network-level failure that survived every retry
    #[error("Transport error after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },

    /// Body was not a well-formed response envelope
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Upstream answered with a non-zero application code
    #[error("Application error {code}: {message}")]
    Application { code: i64, message: String },

    /// Shared call budget for this run is spent
    #[error("Rate budget exhausted ({calls_made}/{ceiling} calls)")]
    BudgetExhausted { calls_made: u32, ceiling: u32 },

    /// Run was cancelled before the request was sent
    #[error("Request cancelled")]
    Cancelled,

    /// Request could not be built (bad URL, bad parameters)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Whether this error is a soft stop rather than a failure
    pub fn is_soft_stop(&self) -> bool {
        matches!(self, Self::BudgetExhausted { .. } | Self::Cancelled)
    }

    /// Short machine-friendly label, used for metrics and api call logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Protocol(_) => "protocol",
            Self::Application { .. } => "application",
            Self::BudgetExhausted { .. } => "budget_exhausted",
            Self::Cancelled => "cancelled",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// Errors propagated from the storage gateway
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem failure while opening the store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection mutex was poisoned by a panicking writer
    #[error("Storage connection lock poisoned")]
    LockPoisoned,

    /// Injected or backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Result alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_names_every_absent_value() {
        let err = CredentialError::Missing {
            account: "Acme".to_string(),
            missing: vec!["ACME_SECRET_KEY".to_string(), "ACME_USER_ID".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Missing credentials for Acme: ACME_SECRET_KEY, ACME_USER_ID"
        );
    }

    #[test]
    fn test_soft_stop_classification() {
        assert!(ClientError::Cancelled.is_soft_stop());
        assert!(ClientError::BudgetExhausted {
            calls_made: 580,
            ceiling: 580
        }
        .is_soft_stop());
        assert!(!ClientError::Protocol("bad".into()).is_soft_stop());
        assert!(!ClientError::Application {
            code: 1,
            message: "denied".into()
        }
        .is_soft_stop());
    }
}
