//! Pagination walker for list endpoints
//!
//! A walk starts at page 1 and stops when:
//! - a page returns zero rows (always wins, whatever the totals say)
//! - the page number reaches the most recently reported total-page count
//! - no total is known and a page comes back short
//! - `max_pages` pages were fetched
//! - a page fetch fails (rows gathered so far are kept)
//! - the run is cancelled

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::endpoint::Endpoint;
use super::response::Page;
use super::PoolClient;
use crate::config::Config;
use crate::credentials::Credential;
use crate::storage::StorageGateway;
use crate::utils::error::ClientError;

/// Anything that can serve one page of rows
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page, ClientError>;
}

/// Position within one walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub page_number: u32,
    pub page_size: u32,
    pub total_pages_known: Option<u32>,
}

impl PageCursor {
    fn new(page_size: u32) -> Self {
        Self {
            page_number: 1,
            page_size,
            total_pages_known: None,
        }
    }
}

/// Result of fetching a single page
#[derive(Debug)]
pub struct PageOutcome {
    pub rows: Vec<Value>,
    pub is_last: bool,
    pub total_records: Option<u64>,
    pub error: Option<ClientError>,
}

/// Result of a full walk
#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub rows: Vec<Value>,
    pub pages_fetched: u32,
    pub total_records_reported: Option<u64>,
    /// Set when the walk stopped early; `rows` holds what was gathered
    pub error: Option<ClientError>,
}

impl WalkOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Drives "fetch all pages" over a [`PageSource`]
#[derive(Debug, Clone)]
pub struct PaginationWalker {
    page_size: u32,
    max_pages: u32,
    page_delay: Duration,
}

impl PaginationWalker {
    pub fn new(page_size: u32, max_pages: u32, page_delay: Duration) -> Self {
        Self {
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
            page_delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.api.page_size,
            config.api.max_pages,
            Duration::from_millis(config.api.page_delay_ms),
        )
    }

    /// Same walker with a different page cap
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetch the page under `cursor` and decide whether it is the last one
    async fn next_page(&self, source: &dyn PageSource, cursor: &mut PageCursor) -> PageOutcome {
        let page = match source.fetch_page(cursor.page_number, cursor.page_size).await {
            Ok(page) => page,
            Err(error) => {
                return PageOutcome {
                    rows: Vec::new(),
                    is_last: true,
                    total_records: None,
                    error: Some(error),
                }
            }
        };

        if let Some(total) = page.total_pages {
            if cursor.total_pages_known.is_some_and(|known| known != total) {
                debug!(
                    page = cursor.page_number,
                    previous = cursor.total_pages_known,
                    reported = total,
                    "Total page count changed mid-walk"
                );
            }
            cursor.total_pages_known = Some(total);
        }

        let is_last = if page.rows.is_empty() {
            true
        } else if let Some(total) = cursor.total_pages_known {
            cursor.page_number >= total
        } else {
            page.rows.len() < cursor.page_size as usize
        };

        PageOutcome {
            rows: page.rows,
            is_last,
            total_records: page.total_records,
            error: None,
        }
    }

    /// Walk every page of `source`
    pub async fn fetch_all(&self, source: &dyn PageSource, cancel: &CancellationToken) -> WalkOutcome {
        let mut cursor = PageCursor::new(self.page_size);
        let mut outcome = WalkOutcome::default();

        loop {
            if cursor.page_number > 1 {
                if cancel.is_cancelled() {
                    outcome.error = Some(ClientError::Cancelled);
                    break;
                }
                if !self.page_delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            outcome.error = Some(ClientError::Cancelled);
                            break;
                        }
                        _ = tokio::time::sleep(self.page_delay) => {}
                    }
                }
            }

            let page = self.next_page(source, &mut cursor).await;
            if let Some(error) = page.error {
                warn!(
                    page = cursor.page_number,
                    rows_kept = outcome.rows.len(),
                    error = %error,
                    "Page fetch failed, keeping partial rows"
                );
                outcome.error = Some(error);
                break;
            }

            outcome.pages_fetched += 1;
            if page.total_records.is_some() {
                outcome.total_records_reported = page.total_records;
            }
            debug!(
                page = cursor.page_number,
                rows = page.rows.len(),
                total_pages = cursor.total_pages_known,
                "Fetched page"
            );
            outcome.rows.extend(page.rows);

            if page.is_last {
                break;
            }
            if cursor.page_number >= self.max_pages {
                warn!(max_pages = self.max_pages, "Page cap reached, stopping walk");
                break;
            }
            cursor.page_number += 1;
        }

        outcome
    }

    /// Walk a paginated endpoint
    pub async fn walk_endpoint(
        &self,
        source: &EndpointPages<'_>,
        cancel: &CancellationToken,
    ) -> WalkOutcome {
        self.fetch_all(source, cancel).await
    }
}

/// [`PageSource`] backed by a signed endpoint, one account at a time
pub struct EndpointPages<'a> {
    pub client: &'a PoolClient,
    pub endpoint: Endpoint,
    pub account: &'a str,
    pub credential: &'a Credential,
    pub coin: &'a str,
    /// Endpoint parameters sent with every page
    pub extra: Vec<(String, String)>,
    /// Where each page request is logged, if anywhere
    pub call_log: Option<&'a dyn StorageGateway>,
}

impl<'a> EndpointPages<'a> {
    pub fn new(
        client: &'a PoolClient,
        endpoint: Endpoint,
        account: &'a str,
        credential: &'a Credential,
        coin: &'a str,
    ) -> Self {
        Self {
            client,
            endpoint,
            account,
            credential,
            coin,
            extra: Vec::new(),
            call_log: None,
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: &str, value: impl ToString) -> Self {
        self.extra.push((key.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_call_log(mut self, call_log: &'a dyn StorageGateway) -> Self {
        self.call_log = Some(call_log);
        self
    }
}

#[async_trait]
impl PageSource for EndpointPages<'_> {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page, ClientError> {
        let mut params = self.endpoint.paging_params(page, page_size);
        params.extend(self.extra.iter().cloned());

        let payload = self
            .client
            .call_for_account(
                self.endpoint,
                self.account,
                self.credential,
                self.coin,
                &params,
                self.call_log,
            )
            .await?;
        Ok(Page::from_payload(payload))
    }
}
