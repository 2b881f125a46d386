//! Pagination walker behaviour, against scripted page sources and a mock
//! worker-list endpoint

mod common;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer};

use poolsync::client::{
    Endpoint, EndpointPages, Page, PageSource, PaginationWalker, PoolClient, RateBudget,
};
use poolsync::utils::error::ClientError;

use common::{credential, ok, test_config, worker_page};

/// Serves `records` rows, `page_size` at a time, reporting totals as told
struct Scripted {
    records: usize,
    report_totals: bool,
    fail_on: Option<u32>,
    total_override: Option<Box<dyn Fn(u32) -> u32 + Send + Sync>>,
    calls: AtomicU32,
}

impl Scripted {
    fn new(records: usize) -> Self {
        Self {
            records,
            report_totals: true,
            fail_on: None,
            total_override: None,
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSource for Scripted {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == Some(page) {
            return Err(ClientError::Transport {
                attempts: 3,
                message: "connection reset".to_string(),
            });
        }

        let size = page_size as usize;
        let start = (page as usize - 1) * size;
        let rows: Vec<Value> = (start..self.records.min(start + size))
            .map(|i| json!({ "workerName": format!("w{i}") }))
            .collect();

        let total_pages = match &self.total_override {
            Some(f) => Some(f(page)),
            None if self.report_totals => Some(self.records.div_ceil(size) as u32),
            None => None,
        };

        Ok(Page {
            rows,
            total_pages,
            total_records: self.report_totals.then_some(self.records as u64),
        })
    }
}

fn walker(page_size: u32) -> PaginationWalker {
    PaginationWalker::new(page_size, 200, Duration::ZERO)
}

#[tokio::test]
async fn test_walk_fetches_ceil_pages() {
    let source = Scripted::new(23);
    let outcome = walker(5).fetch_all(&source, &CancellationToken::new()).await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.rows.len(), 23);
    assert_eq!(outcome.pages_fetched, 5);
    assert_eq!(source.calls(), 5);
    assert_eq!(outcome.total_records_reported, Some(23));
}

#[tokio::test]
async fn test_walk_without_totals_stops_on_empty_page() {
    let mut source = Scripted::new(20);
    source.report_totals = false;

    // Four full pages, then an empty fifth one ends the walk
    let outcome = walker(5).fetch_all(&source, &CancellationToken::new()).await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.rows.len(), 20);
    assert_eq!(source.calls(), 5);
    assert_eq!(outcome.total_records_reported, None);
}

#[tokio::test]
async fn test_walk_without_totals_stops_on_short_page() {
    let mut source = Scripted::new(12);
    source.report_totals = false;

    let outcome = walker(5).fetch_all(&source, &CancellationToken::new()).await;

    assert_eq!(outcome.rows.len(), 12);
    assert_eq!(source.calls(), 3);
}

#[tokio::test]
async fn test_empty_first_page() {
    let source = Scripted::new(0);
    let outcome = walker(5).fetch_all(&source, &CancellationToken::new()).await;

    assert!(outcome.is_complete());
    assert!(outcome.rows.is_empty());
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_latest_total_is_trusted() {
    // Page 1 claims 2 pages, page 2 says there are 4
    let mut source = Scripted::new(40);
    source.total_override = Some(Box::new(|page| if page == 1 { 2 } else { 4 }));

    let outcome = walker(5).fetch_all(&source, &CancellationToken::new()).await;

    assert_eq!(source.calls(), 4);
    assert_eq!(outcome.rows.len(), 20);
}

#[tokio::test]
async fn test_empty_page_wins_over_total() {
    // Claims 10 pages but runs dry after 2
    let mut source = Scripted::new(10);
    source.total_override = Some(Box::new(|_| 10));

    let outcome = walker(5).fetch_all(&source, &CancellationToken::new()).await;

    assert_eq!(outcome.rows.len(), 10);
    assert_eq!(source.calls(), 3);
}

#[tokio::test]
async fn test_error_keeps_partial_rows() {
    let mut source = Scripted::new(30);
    source.fail_on = Some(3);

    let outcome = walker(5).fetch_all(&source, &CancellationToken::new()).await;

    assert!(!outcome.is_complete());
    assert_eq!(outcome.rows.len(), 10);
    assert_eq!(outcome.pages_fetched, 2);
    assert!(matches!(outcome.error, Some(ClientError::Transport { .. })));
}

#[tokio::test]
async fn test_page_cap() {
    let source = Scripted::new(1000);
    let outcome = PaginationWalker::new(5, 3, Duration::ZERO)
        .fetch_all(&source, &CancellationToken::new())
        .await;

    assert_eq!(source.calls(), 3);
    assert_eq!(outcome.rows.len(), 15);
    assert!(outcome.is_complete());
}

#[tokio::test]
async fn test_cancelled_walk_stops_between_pages() {
    let source = Scripted::new(50);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = walker(5).fetch_all(&source, &cancel).await;

    assert_eq!(source.calls(), 1);
    assert_eq!(outcome.rows.len(), 5);
    assert!(matches!(outcome.error, Some(ClientError::Cancelled)));
}

/// Walk the worker-list endpoint through the signed client
#[tokio::test]
async fn test_endpoint_walk_sends_paging_params() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/userWorkerList.htm"))
        .and(body_string_contains("page=1&pageSize=2"))
        .and(body_string_contains("workerStatus=0"))
        .respond_with(ok(worker_page(&["rig-a", "rig-b"], 2, 3)))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/userWorkerList.htm"))
        .and(body_string_contains("page=2&pageSize=2"))
        .respond_with(ok(worker_page(&["rig-c"], 2, 3)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = test_config(&mock_server.uri());
    let budget = Arc::new(RateBudget::new(100, Duration::from_secs(600)));
    let client = PoolClient::new(&config, budget).unwrap();
    let credential = credential();

    let source = EndpointPages::new(&client, Endpoint::WorkerList, "Acct01", &credential, "BTC")
        .with_param("workerStatus", 0);
    let outcome = PaginationWalker::from_config(&config)
        .walk_endpoint(&source, &CancellationToken::new())
        .await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.rows.len(), 3);
    assert_eq!(outcome.pages_fetched, 2);
    assert_eq!(outcome.total_records_reported, Some(3));
    assert_eq!(client.budget().calls_made(), 2);
}
