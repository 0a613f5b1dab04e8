//! Prometheus metrics for request and chain instrumentation.
//!
//! This module provides metrics for:
//! - HTTP request counts and latency per route
//! - Chain runs and failures per endpoint
//! - Model request latency
//! - Retrieval latency and result sizes

use std::sync::OnceLock;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

// === Metric Name Constants ===

/// HTTP requests counter metric name.
pub const METRIC_HTTP_REQUESTS: &str = "http_requests_total";
/// HTTP request latency metric name.
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "http_request_latency_ms";
/// Chain runs counter metric name.
pub const METRIC_CHAIN_RUNS: &str = "chain_runs_total";
/// Chain failures counter metric name.
pub const METRIC_CHAIN_FAILURES: &str = "chain_failures_total";
/// Model request latency metric name.
pub const METRIC_LLM_REQUEST_LATENCY: &str = "llm_request_latency_ms";
/// Retrieval latency metric name.
pub const METRIC_RETRIEVAL_LATENCY: &str = "retrieval_latency_ms";
/// Retrieved documents per query metric name.
pub const METRIC_RETRIEVED_DOCUMENTS: &str = "retrieved_documents";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and register metric descriptions.
///
/// Safe to call more than once; later calls return the installed handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let handle = METRICS_HANDLE.get_or_init(|| handle).clone();

    describe_counter!(METRIC_HTTP_REQUESTS, "Total number of HTTP requests served");
    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "HTTP request latency in milliseconds"
    );
    describe_counter!(METRIC_CHAIN_RUNS, "Total number of chain runs by endpoint");
    describe_counter!(
        METRIC_CHAIN_FAILURES,
        "Total number of chain runs that failed by endpoint"
    );
    describe_histogram!(
        METRIC_LLM_REQUEST_LATENCY,
        "Chat model request latency in milliseconds"
    );
    describe_histogram!(
        METRIC_RETRIEVAL_LATENCY,
        "Document retrieval latency in milliseconds"
    );
    describe_histogram!(
        METRIC_RETRIEVED_DOCUMENTS,
        "Number of documents returned per retrieval"
    );

    debug!("Metrics initialized");
    Ok(handle)
}

/// Handle for a recorder that is not installed globally.
///
/// Renders an empty exposition; used when the router is built without a
/// process-wide recorder (tests, tooling).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Record a served HTTP request.
pub fn record_http_request(start: Instant, method: &str, path: &str, status: u16) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    counter!(
        METRIC_HTTP_REQUESTS,
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(latency_ms);
}

/// Increment chain runs counter.
pub fn inc_chain_runs(endpoint: &str) {
    counter!(METRIC_CHAIN_RUNS, "endpoint" => endpoint.to_string()).increment(1);
}

/// Increment chain failures counter.
pub fn inc_chain_failures(endpoint: &str) {
    counter!(METRIC_CHAIN_FAILURES, "endpoint" => endpoint.to_string()).increment(1);
}

/// Record how many documents a retrieval returned.
pub fn record_retrieved_documents(count: usize) {
    histogram!(METRIC_RETRIEVED_DOCUMENTS).record(count as f64);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(self.elapsed_ms());
    }
}

/// Create a latency timer for model requests.
pub fn timer_llm_request() -> LatencyTimer {
    LatencyTimer::new(METRIC_LLM_REQUEST_LATENCY)
}

/// Create a latency timer for retrieval.
pub fn timer_retrieval() -> LatencyTimer {
    LatencyTimer::new(METRIC_RETRIEVAL_LATENCY)
}
