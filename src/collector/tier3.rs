//! Tier 3: detailed fetch for problem accounts only

use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::{absorb, stored, Collector, CollectionResult, Interrupt, SchedulerRunContext};
use crate::client::{Endpoint, PoolClient};
use crate::credentials::{AccountSpec, Credential};
use crate::models::Tier;
use crate::normalize::normalize_overview;
use crate::storage::ProblemCriteria;

impl Collector {
    /// Overview plus worker walk, for accounts flagged by recent tier 1/2
    /// snapshots
    pub async fn tier3(&self, ctx: &SchedulerRunContext, coin: &str) -> CollectionResult {
        let calls_before = ctx.budget().total_calls();
        let mut result = CollectionResult::new(Tier::Tier3, coin, ctx.run_id());

        let accounts = self.problem_accounts(&mut result).await;
        info!(accounts = accounts.len(), "Selected accounts for detailed fetch");
        self.for_each_account(ctx, &accounts, coin, &mut result).await;

        self.finish(ctx, result, calls_before)
    }

    /// Registry accounts matching the problem query, in registry order
    ///
    /// Falls back to the first `problem_fallback_count` accounts when the
    /// query itself fails.
    async fn problem_accounts(&self, result: &mut CollectionResult) -> Vec<&AccountSpec> {
        let policy = &self.config.collector;
        let criteria = ProblemCriteria {
            since: Utc::now() - chrono::Duration::hours(i64::from(policy.problem_lookback_hours)),
            limit: policy.problem_limit,
            zero_hashrate: policy.problem_zero_hashrate,
            inactive_workers: policy.problem_inactive_workers,
        };

        match self.storage.problem_accounts(&criteria).await {
            Ok(names) => {
                let flagged: HashSet<&str> = names.iter().map(String::as_str).collect();
                let selected: Vec<&AccountSpec> = self
                    .credentials
                    .accounts()
                    .iter()
                    .filter(|spec| flagged.contains(spec.name.as_str()))
                    .collect();
                if selected.len() < flagged.len() {
                    debug!(
                        flagged = flagged.len(),
                        registered = selected.len(),
                        "Ignoring problem accounts outside the registry"
                    );
                }
                selected
            }
            Err(e) => {
                let fallback = policy.problem_fallback_count;
                warn!(error = %e, fallback, "Problem account query failed, using fallback accounts");
                result.warnings.push(format!(
                    "problem account query failed ({e}); fell back to the first {fallback} accounts"
                ));
                self.credentials.accounts().iter().take(fallback).collect()
            }
        }
    }

    pub(super) async fn tier3_account(
        &self,
        ctx: &SchedulerRunContext,
        client: &PoolClient,
        spec: &AccountSpec,
        credential: &Credential,
        coin: &str,
        result: &mut CollectionResult,
    ) -> Result<(), Interrupt> {
        match self
            .fetch_object(client, Endpoint::AccountOverview, &spec.name, credential, coin, result)
            .await
        {
            Ok(data) => {
                let overview = normalize_overview(&data, &spec.name, coin, Utc::now());
                let outcome = self.storage.insert_account_overview(&overview).await;
                stored(result, &spec.name, outcome);
            }
            Err(error) => absorb(result, &spec.name, error)?,
        }

        self.collect_workers(ctx, client, spec, credential, coin, result)
            .await
    }
}
