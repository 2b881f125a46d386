//! Unified error handling for the poolsync crate
//!
//! Domain errors ([`ClientError`], [`CredentialError`], [`StorageError`]) stay
//! available for callers that need the detail; [`Error`] wraps them for the
//! command layer. Per-account failures in a run report are classified through
//! the same [`ErrorCategory`].
//!
//! # Architecture
//!
//! - [`PoolsyncErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors

use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub use crate::utils::error::{ClientError, CredentialError, StorageError};

/// Common trait for all poolsync error types
pub trait PoolsyncErrorTrait: std::error::Error {
    /// Check if this error is recoverable (a later run may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing or unknown account credentials
    Credential,
    /// Network-related errors (HTTP, timeout)
    Network,
    /// Malformed upstream responses
    Protocol,
    /// Upstream rejected the request
    Upstream,
    /// Shared call budget spent
    Budget,
    /// Storage and I/O errors
    Storage,
    /// Configuration errors
    Config,
    /// Run stopped on request
    Cancelled,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credential => "credential",
            Self::Network => "network",
            Self::Protocol => "protocol",
            Self::Upstream => "upstream",
            Self::Budget => "budget",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PoolsyncErrorTrait for ClientError {
    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::BudgetExhausted { .. } | Self::Cancelled
        )
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport { .. } => ErrorCategory::Network,
            Self::BudgetExhausted { .. } => ErrorCategory::Budget,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::Application { .. } => ErrorCategory::Upstream,
            Self::InvalidRequest(_) => ErrorCategory::Config,
        }
    }
}

impl PoolsyncErrorTrait for CredentialError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Credential
    }
}

impl PoolsyncErrorTrait for StorageError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Backend(_))
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Storage
    }
}

/// Unified error type for the poolsync crate
#[derive(Error, Debug)]
pub enum Error {
    /// Request client errors
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Credential resolution errors
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Storage gateway errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PoolsyncErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Client(e) => e.is_recoverable(),
            Self::Credential(e) => e.is_recoverable(),
            Self::Storage(e) => e.is_recoverable(),
            Self::Json(_) | Self::Config(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Client(e) => e.category(),
            Self::Credential(e) => e.category(),
            Self::Storage(e) => e.category(),
            Self::Json(_) => ErrorCategory::Protocol,
            Self::Config(_) => ErrorCategory::Config,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
