//! poolsync - tiered mining-pool API collector
//!
//! Polls a signed mining-pool API across a fleet of credentialed
//! sub-accounts, normalizes the heterogeneous responses and persists them,
//! while staying under a shared rolling call budget.
//!
//! # Architecture
//!
//! - [`config`] - Configuration management and settings
//! - [`credentials`] - Account registry and credential resolution
//! - [`client`] - Signed request client, rate budget and pagination
//! - [`normalize`] - Conversion of raw payloads into canonical records
//! - [`storage`] - Storage gateway (SQLite and in-memory)
//! - [`collector`] - The four collection tiers and their results
//! - [`error`] - Unified error type and failure categories
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use poolsync::collector::{Collector, SchedulerRunContext};
//! use poolsync::config::Config;
//! use poolsync::credentials::CredentialStore;
//! use poolsync::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let credentials = CredentialStore::from_env(config.accounts.clone());
//!     let storage = Arc::new(SqliteStorage::new(&config.database.sqlite_path)?);
//!     let collector = Collector::new(config.clone(), credentials, storage)?;
//!
//!     // Each run brings its own budget and cancellation token
//!     let ctx = SchedulerRunContext::from_config(&config);
//!     let result = collector.tier1(&ctx, "BTC").await;
//!     println!("success: {}", result.success);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod collector;
pub mod config;
pub mod credentials;
pub mod error;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::{Endpoint, PoolClient, RateBudget};
    pub use crate::collector::{CollectionResult, Collector, SchedulerRunContext};
    pub use crate::config::Config;
    pub use crate::credentials::{AccountSpec, Credential, CredentialStore};
    pub use crate::error::{Error, ErrorCategory, PoolsyncErrorTrait, Result};
    pub use crate::models::{AccountKind, Tier};
    pub use crate::storage::{MemoryStorage, SqliteStorage, StorageGateway};
}

// Direct re-exports for convenience
pub use models::{AccountKind, Tier};
