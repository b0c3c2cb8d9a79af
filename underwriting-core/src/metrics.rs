//! Metrics Registry: Counter/Histogram/Gauge abstractions
//! backed by the `prometheus` crate, exposed as text exposition at
//! `/metrics` by the http-api crate.

use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder,
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_with_registry,
};

pub struct Metrics {
    pub registry: Registry,

    pub http_requests_total: IntCounterVec,
    pub http_request_duration_ms: HistogramVec,
    pub http_request_errors_total: IntCounterVec,

    pub jobs_created_total: IntCounterVec,
    pub jobs_failed_total: IntCounterVec,
    pub underwrite_duration_seconds: HistogramVec,
    pub parser_seconds: HistogramVec,
    pub collateral_seconds: HistogramVec,
    pub llm_seconds: HistogramVec,

    pub webhook_attempts_total: IntCounterVec,
    pub webhook_failures_total: IntCounterVec,

    pub queue_backlog: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = register_int_counter_vec_with_registry!(
            "http_requests_total",
            "Total HTTP requests",
            &["method", "path", "status_code", "tenant_id"],
            registry
        )
        .expect("metric registration");

        let http_request_duration_ms = register_histogram_vec_with_registry!(
            "http_request_duration_ms",
            "HTTP request duration in milliseconds",
            &["method", "path", "status_code", "tenant_id"],
            registry
        )
        .expect("metric registration");

        let http_request_errors_total = register_int_counter_vec_with_registry!(
            "http_request_errors_total",
            "Total HTTP 5xx responses",
            &["method", "path", "tenant_id"],
            registry
        )
        .expect("metric registration");

        let jobs_created_total = register_int_counter_vec_with_registry!(
            "jobs_created_total",
            "Total jobs admitted",
            &["tenant_id"],
            registry
        )
        .expect("metric registration");

        let jobs_failed_total = register_int_counter_vec_with_registry!(
            "jobs_failed_total",
            "Total jobs that transitioned to failed",
            &["tenant_id"],
            registry
        )
        .expect("metric registration");

        let underwrite_duration_seconds = register_histogram_vec_with_registry!(
            "underwrite_duration_seconds",
            "Per-stage pipeline duration in seconds",
            &["tenant_id", "stage"],
            registry
        )
        .expect("metric registration");

        let parser_seconds = register_histogram_vec_with_registry!(
            "parser_seconds",
            "Bank statement parsing duration in seconds",
            &["tenant_id"],
            registry
        )
        .expect("metric registration");

        let collateral_seconds = register_histogram_vec_with_registry!(
            "collateral_seconds",
            "Collateral valuation call duration in seconds",
            &["tenant_id"],
            registry
        )
        .expect("metric registration");

        let llm_seconds = register_histogram_vec_with_registry!(
            "llm_seconds",
            "Credit memo generation call duration in seconds",
            &["tenant_id"],
            registry
        )
        .expect("metric registration");

        let webhook_attempts_total = register_int_counter_vec_with_registry!(
            "webhook_attempts_total",
            "Webhook delivery attempts",
            &["tenant_id", "status"],
            registry
        )
        .expect("metric registration");

        let webhook_failures_total = register_int_counter_vec_with_registry!(
            "webhook_failures_total",
            "Webhook deliveries that exhausted retries",
            &["tenant_id"],
            registry
        )
        .expect("metric registration");

        let queue_backlog = register_int_gauge_with_registry!(
            "queue_backlog",
            "Current depth of the underwrite queue",
            registry
        )
        .expect("metric registration");

        Self {
            registry,
            http_requests_total,
            http_request_duration_ms,
            http_request_errors_total,
            jobs_created_total,
            jobs_failed_total,
            underwrite_duration_seconds,
            parser_seconds,
            collateral_seconds,
            llm_seconds,
            webhook_attempts_total,
            webhook_failures_total,
            queue_backlog,
        }
    }

    /// Text exposition format for `GET /metrics`.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .expect("prometheus encoding never fails for well-formed metrics");
        String::from_utf8(buffer).expect("prometheus text exposition is valid utf-8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
