//! Tier 4: payment history, then retention cleanup

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{
    absorb, AccountError, CleanupReport, Collector, CollectionResult, Interrupt,
    SchedulerRunContext,
};
use crate::client::{Endpoint, EndpointPages, PoolClient};
use crate::credentials::{AccountSpec, Credential};
use crate::models::Tier;
use crate::normalize::normalize_payment;
use crate::storage::Table;

const PAYMENT_TYPE: &str = "payout";

impl Collector {
    /// Collect payouts for every account, then prune every table with a
    /// retention window
    ///
    /// Cleanup always runs, whatever happened during collection.
    pub async fn tier4(&self, ctx: &SchedulerRunContext, coin: &str) -> CollectionResult {
        let calls_before = ctx.budget().total_calls();
        let mut result = CollectionResult::new(Tier::Tier4, coin, ctx.run_id());

        let accounts: Vec<&AccountSpec> = self.credentials.accounts().iter().collect();
        self.for_each_account(ctx, &accounts, coin, &mut result).await;

        result.cleanup = self.cleanup().await;

        self.finish(ctx, result, calls_before)
    }

    pub(super) async fn tier4_account(
        &self,
        ctx: &SchedulerRunContext,
        client: &PoolClient,
        spec: &AccountSpec,
        credential: &Credential,
        coin: &str,
        result: &mut CollectionResult,
    ) -> Result<(), Interrupt> {
        let source =
            EndpointPages::new(client, Endpoint::PaymentHistory, &spec.name, credential, coin)
                .with_param("type", PAYMENT_TYPE)
                .with_call_log(self.storage.as_ref());
        let walker = self
            .walker
            .clone()
            .with_max_pages(self.config.collector.payment_max_pages);
        let walk = walker.walk_endpoint(&source, ctx.cancel_token()).await;

        let observed_at = Utc::now();
        let mut rejected = Vec::new();
        for row in &walk.rows {
            let Some(payment) = normalize_payment(row, &spec.name, coin, PAYMENT_TYPE, observed_at)
            else {
                rejected.push(row.clone());
                continue;
            };
            if let Err(e) = self.storage.insert_payment(&payment).await {
                warn!(account = %spec.name, error = %e, "Failed to store payment");
                result.record_error(AccountError::storage(&spec.name, &e));
                break;
            }
            result.records_collected += 1;
        }

        if !rejected.is_empty() {
            debug!(account = %spec.name, invalid = rejected.len(), "Skipped invalid payment rows");
        }
        self.capture_walk(&spec.name, Endpoint::PaymentHistory, coin, &walk.rows, rejected, result)
            .await;

        match walk.error {
            None => Ok(()),
            Some(error) => absorb(result, &spec.name, error),
        }
    }

    /// Delete rows past their retention window, table by table
    ///
    /// Tables kept forever are skipped. A failing table is reported and the
    /// rest still run.
    pub async fn cleanup(&self) -> Vec<CleanupReport> {
        let mut reports = Vec::new();

        for table in Table::all() {
            let Some(age) = self.config.retention.for_table(table) else {
                debug!(table = %table, "Retention disabled, keeping all rows");
                continue;
            };

            let report = match self.storage.cleanup_older_than(table, age).await {
                Ok(deleted) => {
                    info!(table = %table, deleted, days = age.num_days(), "Retention cleanup");
                    CleanupReport {
                        table,
                        retention_days: age.num_days(),
                        deleted,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(table = %table, error = %e, "Retention cleanup failed");
                    CleanupReport {
                        table,
                        retention_days: age.num_days(),
                        deleted: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            reports.push(report);
        }

        reports
    }
}
