use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec, TextEncoder,
};

// Metrics registry
static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap()
});

static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0]
    )
    .unwrap()
});

static PROVISIONING_TRIGGERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "kcp_provisioning_triggers_total",
        "Provisioning triggers issued to the workflow runner",
        &["kind", "outcome"]
    )
    .unwrap()
});

static ENVIRONMENT_CALLBACKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "kcp_environment_callbacks_total",
        "Per-environment provisioning results received",
        &["environment", "status"]
    )
    .unwrap()
});

static LINEAGE_OBSERVATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "kcp_lineage_observations_total",
        "Lineage observations received",
        &["direction", "outcome"]
    )
    .unwrap()
});

static APPROVAL_TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "kcp_approval_transitions_total",
        "Approval request state transitions",
        &["kind", "to"]
    )
    .unwrap()
});

static QUOTA_DECISIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "kcp_quota_decisions_total",
        "Quota evaluations by decision",
        &["decision"]
    )
    .unwrap()
});

pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn record_http_request(method: &str, path: &str, status: u16) {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
    }

    pub fn record_http_duration(method: &str, path: &str, duration: f64) {
        HTTP_REQUEST_DURATION
            .with_label_values(&[method, path])
            .observe(duration);
    }

    /// `kind` is `trigger` or `retry`; `outcome` is `started` or `failed`.
    pub fn record_provisioning_trigger(kind: &str, outcome: &str) {
        PROVISIONING_TRIGGERS_TOTAL
            .with_label_values(&[kind, outcome])
            .inc();
    }

    pub fn record_environment_callback(environment: &str, status: &str) {
        ENVIRONMENT_CALLBACKS_TOTAL
            .with_label_values(&[environment, status])
            .inc();
    }

    pub fn record_lineage_observation(direction: &str, outcome: &str) {
        LINEAGE_OBSERVATIONS_TOTAL
            .with_label_values(&[direction, outcome])
            .inc();
    }

    pub fn record_approval_transition(kind: &str, to: &str) {
        APPROVAL_TRANSITIONS_TOTAL.with_label_values(&[kind, to]).inc();
    }

    pub fn record_quota_decision(allowed: bool) {
        let decision = if allowed { "allowed" } else { "denied" };
        QUOTA_DECISIONS_TOTAL.with_label_values(&[decision]).inc();
    }

    /// Export all metrics in Prometheus format
    pub fn export() -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        encoder.encode_to_string(&metric_families)
    }
}
