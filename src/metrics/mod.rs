//! Prometheus metrics for collection runs
//!
//! This module tracks:
//! - Upstream API calls by endpoint and outcome, with latency
//! - Tier runs by outcome and records collected per tier
//! - Rate budget usage of the current run
//!
//! # Usage
//!
//! Call `init_metrics()` at startup. If initialization fails, metric
//! operations become no-ops. Each run is a short-lived process, so the CLI
//! writes the text exposition to a file (`write_metrics`) for a textfile
//! collector instead of serving it.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use std::path::Path;
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

struct CollectorMetrics {
    api_calls: CounterVec,
    api_duration: HistogramVec,
    tier_runs: CounterVec,
    records_collected: CounterVec,
    budget_calls_made: Gauge,
}

static COLLECTOR_METRICS: OnceLock<CollectorMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Idempotent. If registration fails the error is returned and subsequent
/// metric operations become no-ops.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = CollectorMetrics {
        api_calls: register_counter_vec!(
            "poolsync_api_calls_total",
            "Upstream API calls by endpoint and outcome",
            &["endpoint", "outcome"]
        )?,
        api_duration: register_histogram_vec!(
            "poolsync_api_call_duration_seconds",
            "Upstream API call duration in seconds, retries included",
            &["endpoint"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
        )?,
        tier_runs: register_counter_vec!(
            "poolsync_tier_runs_total",
            "Tier runs by outcome",
            &["tier", "outcome"]
        )?,
        records_collected: register_counter_vec!(
            "poolsync_records_collected_total",
            "Normalized records forwarded to storage",
            &["tier"]
        )?,
        budget_calls_made: register_gauge!(
            "poolsync_budget_calls_made",
            "Calls made in the current rate budget window"
        )?,
    };

    COLLECTOR_METRICS
        .set(metrics)
        .map_err(|_| "Collector metrics already initialized")?;

    tracing::debug!("Prometheus metrics initialized");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    COLLECTOR_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Write the text exposition to `path`
pub fn write_metrics(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let text = encode_metrics()?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Record one logical API call (all attempts included)
pub fn record_api_call(endpoint: &str, outcome: &str, duration_secs: f64) {
    let Some(m) = COLLECTOR_METRICS.get() else {
        return;
    };

    m.api_calls.with_label_values(&[endpoint, outcome]).inc();
    m.api_duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

/// Record the outcome of a tier run
pub fn record_tier_run(tier: &str, success: bool, records: usize) {
    let Some(m) = COLLECTOR_METRICS.get() else {
        return;
    };

    let outcome = if success { "success" } else { "failure" };
    m.tier_runs.with_label_values(&[tier, outcome]).inc();

    if records > 0 {
        m.records_collected
            .with_label_values(&[tier])
            .inc_by(records as f64);
    }
}

pub fn set_budget_calls_made(calls: u32) {
    if let Some(m) = COLLECTOR_METRICS.get() {
        m.budget_calls_made.set(f64::from(calls));
    }
}

// ============================================================================
// Tests
// ============================================================================
