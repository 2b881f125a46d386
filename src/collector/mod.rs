//! Tiered collection scheduler
//!
//! Four independently invocable routines share one [`SchedulerRunContext`]
//! (and therefore one rate budget) per run. The collector itself only holds
//! the transport; each run builds its client from the context it is given,
//! so one collector can serve any number of runs:
//!
//! | Tier | Cadence   | Work                                              |
//! |------|-----------|---------------------------------------------------|
//! | 1    | 10 min    | balance + hashrate summary, offline detection     |
//! | 2    | hourly    | full worker walk, per-account summaries           |
//! | 3    | 2 h/daily | overview + worker walk for problem accounts only  |
//! | 4    | daily     | payment history, then retention cleanup           |
//!
//! Accounts are processed sequentially. Per-account failures are recorded at
//! the account boundary and iteration continues; budget exhaustion and
//! cancellation end the account loop without counting as failures.

mod context;
mod result;
mod tier1;
mod tier2;
mod tier3;
mod tier4;

pub use context::SchedulerRunContext;
pub use result::{is_successful, AccountError, CleanupReport, CollectionResult};

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::{
    Endpoint, EndpointPages, PaginationWalker, PoolClient, RawPayload, ResponseShape, Transport,
};
use crate::config::Config;
use crate::credentials::{AccountSpec, Credential, CredentialStore};
use crate::metrics;
use crate::models::{
    AccountOverviewRecord, AccountSummary, CaptureReason, OverviewSource, RawResponseRecord, Tier,
};
use crate::normalize::normalize_worker;
use crate::storage::StorageGateway;
use crate::utils::error::{ClientError, StorageResult};

/// Why the account loop ended early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    BudgetExhausted,
    Cancelled,
}

impl Interrupt {
    fn apply(self, result: &mut CollectionResult) {
        match self {
            Self::BudgetExhausted => result.budget_exhausted = true,
            Self::Cancelled => result.cancelled = true,
        }
    }
}

/// Record a client error against `account`, or turn a soft stop into an
/// [`Interrupt`]
fn absorb(
    result: &mut CollectionResult,
    account: &str,
    error: ClientError,
) -> Result<(), Interrupt> {
    match error {
        ClientError::BudgetExhausted { calls_made, ceiling } => {
            info!(account = %account, calls_made, ceiling, "Rate budget exhausted, stopping tier");
            Err(Interrupt::BudgetExhausted)
        }
        ClientError::Cancelled => Err(Interrupt::Cancelled),
        error => {
            warn!(account = %account, kind = error.kind(), error = %error, "Account request failed");
            result.record_error(AccountError::client(account, &error));
            Ok(())
        }
    }
}

/// Count a stored record, or record the storage failure against `account`
fn stored(result: &mut CollectionResult, account: &str, outcome: StorageResult<()>) {
    match outcome {
        Ok(()) => result.records_collected += 1,
        Err(e) => {
            warn!(account = %account, error = %e, "Failed to store record");
            result.record_error(AccountError::storage(account, &e));
        }
    }
}

/// Runs collection tiers against the configured accounts
pub struct Collector {
    config: Config,
    credentials: CredentialStore,
    storage: Arc<dyn StorageGateway>,
    transport: Transport,
    walker: PaginationWalker,
}

impl Collector {
    /// Build a collector; budgets and cancellation come from each run's
    /// context
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidRequest` if the HTTP client cannot be built
    pub fn new(
        config: Config,
        credentials: CredentialStore,
        storage: Arc<dyn StorageGateway>,
    ) -> Result<Self, ClientError> {
        let transport = Transport::new(&config)?;
        let walker = PaginationWalker::from_config(&config);
        Ok(Self {
            config,
            credentials,
            storage,
            transport,
            walker,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Client drawing on `ctx`'s budget and stopping at its token
    fn client_for(&self, ctx: &SchedulerRunContext) -> PoolClient {
        PoolClient::from_transport(self.transport.clone(), Arc::clone(ctx.budget()))
            .with_cancel(ctx.cancel_token().clone())
    }

    /// Run one tier
    pub async fn run(&self, ctx: &SchedulerRunContext, tier: Tier, coin: &str) -> CollectionResult {
        match tier {
            Tier::Tier1 => self.tier1(ctx, coin).await,
            Tier::Tier2 => self.tier2(ctx, coin).await,
            Tier::Tier3 => self.tier3(ctx, coin).await,
            Tier::Tier4 => self.tier4(ctx, coin).await,
        }
    }

    /// Iterate `accounts`, running the tier's per-account work for each
    ///
    /// Stops before the next account once the run is cancelled or the budget
    /// is spent. An account counts as processed when it finished without
    /// recording any error.
    async fn for_each_account(
        &self,
        ctx: &SchedulerRunContext,
        accounts: &[&AccountSpec],
        coin: &str,
        result: &mut CollectionResult,
    ) {
        let client = self.client_for(ctx);
        for spec in accounts {
            if ctx.is_cancelled() {
                info!(tier = %result.tier, "Run cancelled, stopping before next account");
                Interrupt::Cancelled.apply(result);
                break;
            }
            if ctx.budget().is_exhausted() {
                info!(tier = %result.tier, "Rate budget exhausted, stopping before next account");
                Interrupt::BudgetExhausted.apply(result);
                break;
            }

            result.accounts_attempted += 1;
            let credential = match self.prepare_account(ctx, spec).await {
                Ok(credential) => credential,
                Err(error) => {
                    warn!(account = %spec.name, error = %error.message, "Skipping account");
                    result.record_error(error);
                    continue;
                }
            };

            let outcome = match result.tier {
                Tier::Tier1 => self.tier1_account(&client, spec, &credential, coin, result).await,
                Tier::Tier2 => {
                    self.collect_workers(ctx, &client, spec, &credential, coin, result)
                        .await
                }
                Tier::Tier3 => {
                    self.tier3_account(ctx, &client, spec, &credential, coin, result)
                        .await
                }
                Tier::Tier4 => {
                    self.tier4_account(ctx, &client, spec, &credential, coin, result)
                        .await
                }
            };
            if let Err(interrupt) = outcome {
                interrupt.apply(result);
                break;
            }

            if !result.has_errors_for(&spec.name) {
                result.accounts_processed += 1;
            }
        }
    }

    /// Resolve credentials and make sure the account row exists
    async fn prepare_account(
        &self,
        ctx: &SchedulerRunContext,
        spec: &AccountSpec,
    ) -> Result<Credential, AccountError> {
        let credential = self
            .credentials
            .resolve(&spec.name)
            .map_err(|e| AccountError::credential(&spec.name, &e))?;

        if ctx.account_id(&spec.name).is_none() {
            let id = self
                .storage
                .upsert_account(&spec.name, spec.kind, &credential.subject_id)
                .await
                .map_err(|e| AccountError::storage(&spec.name, &e))?;
            ctx.cache_account_id(&spec.name, id);
            debug!(account = %spec.name, id, "Account registered");
        }

        Ok(credential)
    }

    /// Call a single-object endpoint and return its `data` object
    async fn fetch_object(
        &self,
        client: &PoolClient,
        endpoint: Endpoint,
        account: &str,
        credential: &Credential,
        coin: &str,
        result: &mut CollectionResult,
    ) -> Result<Value, ClientError> {
        if endpoint.shape() != ResponseShape::Object {
            return Err(ClientError::InvalidRequest(format!(
                "{endpoint} is paginated and must be walked"
            )));
        }

        let payload = client
            .call_for_account(
                endpoint,
                account,
                credential,
                coin,
                &[],
                Some(self.storage.as_ref()),
            )
            .await?;

        match payload {
            RawPayload::Object(_) => {
                let data = payload.into_value();
                let reason = CaptureReason::Response;
                self.capture_raw(account, endpoint, coin, reason, 1, &data, result)
                    .await;
                Ok(data)
            }
            RawPayload::List(_) => Err(ClientError::Protocol(format!(
                "{endpoint} returned a list where an object was expected"
            ))),
            RawPayload::None => Err(ClientError::Protocol(format!("{endpoint} returned no data"))),
        }
    }

    /// Walk the worker list, store every normalized worker and the
    /// account summary
    ///
    /// Rows gathered before a page failure are still stored; the summary is
    /// persisted only for complete walks.
    async fn collect_workers(
        &self,
        ctx: &SchedulerRunContext,
        client: &PoolClient,
        spec: &AccountSpec,
        credential: &Credential,
        coin: &str,
        result: &mut CollectionResult,
    ) -> Result<(), Interrupt> {
        let source =
            EndpointPages::new(client, Endpoint::WorkerList, &spec.name, credential, coin)
                .with_param("workerStatus", 0)
                .with_call_log(self.storage.as_ref());
        let walk = self.walker.walk_endpoint(&source, ctx.cancel_token()).await;

        let observed_at = Utc::now();
        let freshness =
            chrono::Duration::minutes(i64::from(self.config.collector.share_freshness_mins));
        let mut summary = AccountSummary::default();
        let mut workers = Vec::with_capacity(walk.rows.len());
        let mut rejected = Vec::new();
        for row in &walk.rows {
            match normalize_worker(row, &spec.name, observed_at, freshness) {
                Some(worker) => {
                    summary.record(worker.status);
                    workers.push(worker);
                }
                None => {
                    summary.record_invalid();
                    rejected.push(row.clone());
                }
            }
        }

        self.capture_walk(&spec.name, Endpoint::WorkerList, coin, &walk.rows, rejected, result)
            .await;
        if summary.invalid > 0 {
            debug!(account = %spec.name, invalid = summary.invalid, "Skipped invalid worker rows");
        }
        if let Some(expected) = walk.total_records_reported {
            if expected != walk.rows.len() as u64 {
                debug!(
                    account = %spec.name,
                    expected,
                    received = walk.rows.len(),
                    "Worker count differs from reported total"
                );
            }
        }

        match self.storage.insert_worker_batch(&workers).await {
            Ok(written) => result.records_collected += written,
            Err(e) => {
                warn!(account = %spec.name, error = %e, "Failed to store workers");
                result.record_error(AccountError::storage(&spec.name, &e));
            }
        }

        if walk.is_complete() {
            let overview = AccountOverviewRecord {
                account: spec.name.clone(),
                coin: coin.to_string(),
                source: OverviewSource::WorkerSummary,
                summary,
                hashrate_1h: workers.iter().fold(0u64, |acc, w| acc.saturating_add(w.hashrate_1h)),
                hashrate_24h: workers.iter().fold(0u64, |acc, w| acc.saturating_add(w.hashrate_24h)),
                observed_at,
            };
            let outcome = self.storage.insert_account_overview(&overview).await;
            stored(result, &spec.name, outcome);
        }

        info!(
            account = %spec.name,
            total = summary.total,
            active = summary.active,
            inactive = summary.inactive,
            invalid = summary.invalid,
            pages = walk.pages_fetched,
            "Workers collected"
        );
        result.account_summaries.insert(spec.name.clone(), summary);

        match walk.error {
            None => Ok(()),
            Some(error) => absorb(result, &spec.name, error),
        }
    }

    /// Keep the rows of one walk verbatim, as far as the capture mode asks
    ///
    /// The whole walk is stored when every response is captured; otherwise
    /// only `rejected`, the rows the normalizer refused.
    async fn capture_walk(
        &self,
        account: &str,
        endpoint: Endpoint,
        coin: &str,
        rows: &[Value],
        rejected: Vec<Value>,
        result: &mut CollectionResult,
    ) {
        if self.config.collector.raw_capture.keeps(CaptureReason::Response) {
            let payload = Value::Array(rows.to_vec());
            let reason = CaptureReason::Response;
            self.capture_raw(account, endpoint, coin, reason, rows.len(), &payload, result)
                .await;
        } else if !rejected.is_empty() {
            let count = rejected.len();
            let payload = Value::Array(rejected);
            let reason = CaptureReason::Unparsed;
            self.capture_raw(account, endpoint, coin, reason, count, &payload, result)
                .await;
        }
    }

    /// Store `payload` as a raw response when the capture mode keeps `reason`
    ///
    /// Best-effort: a failed write becomes a run warning, never an account
    /// error.
    #[allow(clippy::too_many_arguments)]
    async fn capture_raw(
        &self,
        account: &str,
        endpoint: Endpoint,
        coin: &str,
        reason: CaptureReason,
        row_count: usize,
        payload: &Value,
        result: &mut CollectionResult,
    ) {
        if !self.config.collector.raw_capture.keeps(reason) {
            return;
        }

        let record = RawResponseRecord {
            account: account.to_string(),
            endpoint: endpoint.name().to_string(),
            coin: coin.to_string(),
            reason,
            row_count,
            payload: payload.to_string(),
            captured_at: Utc::now(),
        };
        match self.storage.insert_raw_response(&record).await {
            Ok(()) => {
                result.raw_captured += 1;
                debug!(
                    account = %account,
                    endpoint = %endpoint,
                    reason = reason.as_str(),
                    row_count,
                    "Raw payload kept"
                );
            }
            Err(e) => {
                warn!(account = %account, endpoint = %endpoint, error = %e, "Failed to keep raw payload");
                result
                    .warnings
                    .push(format!("{account}: raw {endpoint} payload not kept ({e})"));
            }
        }
    }

    /// Stamp the result, apply the success policy and report
    fn finish(
        &self,
        ctx: &SchedulerRunContext,
        mut result: CollectionResult,
        calls_before: u32,
    ) -> CollectionResult {
        let api_calls = ctx.budget().total_calls().saturating_sub(calls_before);
        result.finish(self.config.collector.error_threshold, api_calls);

        metrics::record_tier_run(result.tier.as_str(), result.success, result.records_collected);
        metrics::set_budget_calls_made(ctx.budget().calls_made());

        info!(
            tier = %result.tier,
            run_id = %result.run_id,
            success = result.success,
            attempted = result.accounts_attempted,
            processed = result.accounts_processed,
            records = result.records_collected,
            raw_captured = result.raw_captured,
            errors = result.errors.len(),
            api_calls = result.api_calls,
            budget_exhausted = result.budget_exhausted,
            cancelled = result.cancelled,
            "Tier run finished"
        );
        result
    }
}
