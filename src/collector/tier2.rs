//! Tier 2: full worker lists for every account

use super::{Collector, CollectionResult, SchedulerRunContext};
use crate::credentials::AccountSpec;
use crate::models::Tier;

impl Collector {
    /// Walk every account's worker list and record per-account summaries
    pub async fn tier2(&self, ctx: &SchedulerRunContext, coin: &str) -> CollectionResult {
        let calls_before = ctx.budget().total_calls();
        let mut result = CollectionResult::new(Tier::Tier2, coin, ctx.run_id());

        let accounts: Vec<&AccountSpec> = self.credentials.accounts().iter().collect();
        self.for_each_account(ctx, &accounts, coin, &mut result).await;

        self.finish(ctx, result, calls_before)
    }
}
