//! Per-run state shared by every tier call

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::RateBudget;
use crate::config::Config;

/// Explicit run state: the shared budget, the account-id cache and the
/// cancellation signal. One instance per scheduler run.
#[derive(Debug)]
pub struct SchedulerRunContext {
    run_id: Uuid,
    budget: Arc<RateBudget>,
    account_ids: Mutex<HashMap<String, i64>>,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
}

impl SchedulerRunContext {
    pub fn new(budget: Arc<RateBudget>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            budget,
            account_ids: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }

    /// Context with a fresh budget sized from configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(RateBudget::new(
            config.budget.ceiling,
            config.budget_window(),
        )))
    }

    /// Use an externally owned cancellation token (signal handlers, timeouts)
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn budget(&self) -> &Arc<RateBudget> {
        &self.budget
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn account_id(&self, name: &str) -> Option<i64> {
        self.account_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .copied()
    }

    pub fn cache_account_id(&self, name: &str, id: i64) {
        self.account_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_account_id_cache() {
        let ctx = SchedulerRunContext::new(Arc::new(RateBudget::new(1, Duration::from_secs(1))));
        assert_eq!(ctx.account_id("Acme"), None);
        ctx.cache_account_id("Acme", 7);
        assert_eq!(ctx.account_id("Acme"), Some(7));
    }

    #[test]
    fn test_runs_get_distinct_ids() {
        let config = Config::default();
        let a = SchedulerRunContext::from_config(&config);
        let b = SchedulerRunContext::from_config(&config);
        assert_ne!(a.run_id(), b.run_id());
        assert_eq!(a.budget().ceiling(), 580);
    }

    #[test]
    fn test_external_cancellation() {
        let token = CancellationToken::new();
        let ctx = SchedulerRunContext::from_config(&Config::default()).with_cancel(token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
