//! Signed request client for the mining-pool API
//!
//! This module provides:
//! - HMAC request signing with strictly increasing nonces
//! - A shared rolling-window call budget and a pacing gate (governor)
//! - Retry with exponential backoff for transient transport failures
//! - Envelope parsing into a canonical [`RawPayload`]
//! - A pagination walker for list endpoints

pub mod budget;
pub mod endpoint;
pub mod pagination;
pub mod response;
pub mod signer;

pub use budget::{BudgetSnapshot, PacingGate, RateBudget};
pub use endpoint::{Endpoint, ResponseShape};
pub use pagination::{EndpointPages, PageOutcome, PageSource, PaginationWalker, WalkOutcome};
pub use response::{Page, RawPayload};
pub use signer::NonceSource;

use chrono::Utc;
use reqwest::{header::USER_AGENT, Client, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::credentials::Credential;
use crate::metrics;
use crate::models::ApiCallRecord;
use crate::storage::StorageGateway;
use crate::utils::error::ClientError;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Connection pool, pacing gate and nonce source
///
/// Lives as long as the process and is shared by every run's
/// [`PoolClient`], so pacing and nonce ordering hold across runs.
#[derive(Clone)]
pub struct Transport {
    /// HTTP client with configured timeout and compression
    http: Client,

    /// Base URL without trailing slash
    base_url: String,

    user_agent: String,

    retry: RetryConfig,

    pacing: Arc<PacingGate>,

    nonces: Arc<NonceSource>,
}

impl Transport {
    /// Build the HTTP client from configuration
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidRequest` if the HTTP client cannot be built
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .gzip(true)
            .build()
            .map_err(|e| ClientError::InvalidRequest(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            user_agent: config.api.user_agent.clone(),
            retry: config.retry(),
            pacing: Arc::new(PacingGate::new(Duration::from_millis(
                config.api.min_interval_ms,
            ))),
            nonces: Arc::new(NonceSource::new()),
        })
    }

    /// Point at another server (mock servers in tests)
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

/// Client for the signed form-POST API, bound to one run
///
/// Draws every attempt from the run's [`RateBudget`] and stops at the run's
/// cancellation token.
pub struct PoolClient {
    transport: Transport,

    budget: Arc<RateBudget>,

    cancel: CancellationToken,
}

impl PoolClient {
    /// Create a client from configuration, sharing `budget`
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidRequest` if the HTTP client cannot be built
    pub fn new(config: &Config, budget: Arc<RateBudget>) -> Result<Self, ClientError> {
        Ok(Self::from_transport(Transport::new(config)?, budget))
    }

    pub fn from_transport(transport: Transport, budget: Arc<RateBudget>) -> Self {
        Self {
            transport,
            budget,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop retrying and sending once `cancel` fires
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Point the client at another server (mock servers in tests)
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.transport = self.transport.with_base_url(base_url);
        self
    }

    pub fn budget(&self) -> &Arc<RateBudget> {
        &self.budget
    }

    /// Call an endpoint for one account
    ///
    /// Every HTTP attempt, retries included, consumes one budget unit and is
    /// signed with a fresh nonce. Only transient transport failures are
    /// retried.
    ///
    /// # Errors
    ///
    /// - `BudgetExhausted` before any request once the ceiling is reached
    /// - `Cancelled` once the run's token fires, including mid-backoff
    /// - `Transport` when retries are spent
    /// - `Protocol` on a malformed body
    /// - `Application` on a non-zero envelope code
    pub async fn call(
        &self,
        endpoint: Endpoint,
        credential: &Credential,
        coin: &str,
        params: &[(String, String)],
    ) -> Result<RawPayload, ClientError> {
        let started = Instant::now();

        let result = with_retry_if(
            &self.transport.retry,
            &self.cancel,
            |attempt| self.attempt(endpoint, credential, coin, params, attempt),
            |e| matches!(e, ClientError::Transport { .. }),
        )
        .await;
        let result = match result {
            Err(ClientError::Transport { .. }) if self.cancel.is_cancelled() => {
                Err(ClientError::Cancelled)
            }
            other => other,
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::record_api_call(endpoint.name(), outcome, started.elapsed().as_secs_f64());
        metrics::set_budget_calls_made(self.budget.calls_made());

        result
    }

    /// [`PoolClient::call`] on behalf of a named account, recording the call
    /// through `call_log` when given
    ///
    /// Logging is best-effort: a failed write is reported at debug level and
    /// never changes the call's result. Soft stops are not logged since no
    /// request completed.
    pub async fn call_for_account(
        &self,
        endpoint: Endpoint,
        account: &str,
        credential: &Credential,
        coin: &str,
        params: &[(String, String)],
        call_log: Option<&dyn StorageGateway>,
    ) -> Result<RawPayload, ClientError> {
        let called_at = Utc::now();
        let started = Instant::now();
        let result = self.call(endpoint, credential, coin, params).await;

        let Some(log) = call_log else {
            return result;
        };
        if matches!(&result, Err(e) if e.is_soft_stop()) {
            return result;
        }

        let record = ApiCallRecord {
            endpoint: endpoint.name().to_string(),
            account: Some(account.to_string()),
            success: result.is_ok(),
            duration_ms: started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64,
            error_kind: result.as_ref().err().map(|e| e.kind().to_string()),
            called_at,
        };
        if let Err(e) = log.log_api_call(&record).await {
            debug!(account = %account, endpoint = %endpoint, error = %e, "Failed to log API call");
        }

        result
    }

    /// One signed HTTP attempt
    async fn attempt(
        &self,
        endpoint: Endpoint,
        credential: &Credential,
        coin: &str,
        params: &[(String, String)],
        attempt: u32,
    ) -> Result<RawPayload, ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        self.budget.try_acquire()?;
        self.transport.pacing.wait().await;

        let auth = signer::authenticate(credential, &self.transport.nonces);
        let mut form: Vec<(String, String)> = vec![
            ("key".to_string(), auth.key),
            ("nonce".to_string(), auth.nonce),
            ("signature".to_string(), auth.signature),
            ("coin".to_string(), coin.to_string()),
            ("userId".to_string(), credential.subject_id.clone()),
            ("clientUserId".to_string(), credential.subject_id.clone()),
        ];
        form.extend(params.iter().cloned());

        let url = format!("{}{}", self.transport.base_url, endpoint.path());
        debug!(endpoint = %endpoint, attempt = attempt, "Sending signed request");

        let reply = self
            .transport
            .http
            .post(&url)
            .header(USER_AGENT, &self.transport.user_agent)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                };
                ClientError::Transport {
                    attempts: attempt + 1,
                    message,
                }
            })?;

        let status = reply.status();
        let body = reply.text().await.map_err(|e| ClientError::Transport {
            attempts: attempt + 1,
            message: format!("failed to read body: {e}"),
        })?;

        match response::parse_envelope(&body) {
            Err(ClientError::Protocol(_)) if should_retry(status) => {
                warn!(endpoint = %endpoint, status = status.as_u16(), "Transient HTTP status");
                Err(ClientError::Transport {
                    attempts: attempt + 1,
                    message: format!("HTTP {status}"),
                })
            }
            Err(ClientError::Protocol(message)) if !status.is_success() => {
                Err(ClientError::Protocol(format!("HTTP {status}: {message}")))
            }
            other => other,
        }
    }
}

/// Statuses treated as transient: 429 and the gateway-style 5xx family
fn should_retry(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

impl std::fmt::Debug for PoolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolClient")
            .field("base_url", &self.transport.base_url)
            .field("retry", &self.transport.retry)
            .field("budget", &self.budget.snapshot())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
