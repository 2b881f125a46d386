//! Tier 1: balance and hashrate summary for every account

use chrono::Utc;
use tracing::warn;

use super::{absorb, stored, Collector, CollectionResult, Interrupt, SchedulerRunContext};
use crate::client::{Endpoint, PoolClient};
use crate::credentials::{AccountSpec, Credential};
use crate::models::{OfflineAccount, Tier};
use crate::normalize::{normalize_balance, normalize_hashrate};

impl Collector {
    /// Two calls per account; accounts with workers but none active are
    /// reported in `offline_accounts`
    pub async fn tier1(&self, ctx: &SchedulerRunContext, coin: &str) -> CollectionResult {
        let calls_before = ctx.budget().total_calls();
        let mut result = CollectionResult::new(Tier::Tier1, coin, ctx.run_id());

        let accounts: Vec<&AccountSpec> = self.credentials.accounts().iter().collect();
        self.for_each_account(ctx, &accounts, coin, &mut result).await;

        self.finish(ctx, result, calls_before)
    }

    pub(super) async fn tier1_account(
        &self,
        client: &PoolClient,
        spec: &AccountSpec,
        credential: &Credential,
        coin: &str,
        result: &mut CollectionResult,
    ) -> Result<(), Interrupt> {
        let observed_at = Utc::now();

        match self
            .fetch_object(client, Endpoint::Account, &spec.name, credential, coin, result)
            .await
        {
            Ok(data) => {
                let balance = normalize_balance(&data, &spec.name, coin, observed_at);
                let outcome = self.storage.insert_balance(&balance).await;
                stored(result, &spec.name, outcome);
            }
            Err(error) => absorb(result, &spec.name, error)?,
        }

        match self
            .fetch_object(client, Endpoint::Hashrate, &spec.name, credential, coin, result)
            .await
        {
            Ok(data) => {
                let hashrate = normalize_hashrate(&data, &spec.name, coin, observed_at);
                if hashrate.is_offline() {
                    warn!(
                        account = %spec.name,
                        total_workers = hashrate.total_workers,
                        "No active workers"
                    );
                    result.offline_accounts.push(OfflineAccount {
                        account: spec.name.clone(),
                        total_workers: hashrate.total_workers,
                        active_workers: hashrate.active_workers,
                    });
                }
                let outcome = self.storage.insert_hashrate(&hashrate).await;
                stored(result, &spec.name, outcome);
            }
            Err(error) => absorb(result, &spec.name, error)?,
        }

        Ok(())
    }
}
