//! Prometheus Metrics Module
//!
//! Provides client-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Connection attempts by outcome and the current connection status
//! - Inbound real-time events by name
//! - Messages sent, reconciliations by rule and send errors
//! - History API request latency histograms

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::infrastructure::realtime::ConnectionStatus;

const NAMESPACE: &str = "dashboard_chat";

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Connection attempts by outcome ("connected", "auth_error", "rejected", "timeout", "transport_error")
pub static CONNECTION_ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("connection_attempts_total", "Real-time connection attempts")
            .namespace(NAMESPACE),
        &["outcome"],
    )
    .expect("Failed to create CONNECTION_ATTEMPTS_TOTAL metric")
});

/// 0 = disconnected, 1 = connecting, 2 = connected
pub static CONNECTION_STATUS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("connection_status", "Current real-time connection status").namespace(NAMESPACE),
    )
    .expect("Failed to create CONNECTION_STATUS metric")
});

/// Inbound events by event name
pub static INBOUND_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("inbound_events_total", "Real-time events received").namespace(NAMESPACE),
        &["event"],
    )
    .expect("Failed to create INBOUND_EVENTS_TOTAL metric")
});

/// Messages sent, by whether they were emitted or kept local
pub static MESSAGES_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("messages_sent_total", "Messages sent by the local user").namespace(NAMESPACE),
        &["state"], // "emitted", "offline"
    )
    .expect("Failed to create MESSAGES_SENT_TOTAL metric")
});

/// Server confirmations by the reconciliation rule that applied
pub static RECONCILIATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reconciliations_total", "Server confirmations reconciled").namespace(NAMESPACE),
        &["rule"], // "replaced", "status_updated", "appended"
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric")
});

/// Messages the server refused
pub static SEND_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new("send_errors_total", "Messages rejected by the server").namespace(NAMESPACE),
    )
    .expect("Failed to create SEND_ERRORS_TOTAL metric")
});

/// History API latency histogram
pub static HISTORY_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
    HistogramVec::new(
        HistogramOpts::new(
            "history_request_duration_seconds",
            "History API request latency in seconds",
        )
        .namespace(NAMESPACE)
        .buckets(buckets),
        &["operation", "outcome"],
    )
    .expect("Failed to create HISTORY_REQUEST_DURATION_SECONDS metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(CONNECTION_ATTEMPTS_TOTAL.clone()))
        .expect("Failed to register CONNECTION_ATTEMPTS_TOTAL");
    registry
        .register(Box::new(CONNECTION_STATUS.clone()))
        .expect("Failed to register CONNECTION_STATUS");
    registry
        .register(Box::new(INBOUND_EVENTS_TOTAL.clone()))
        .expect("Failed to register INBOUND_EVENTS_TOTAL");
    registry
        .register(Box::new(MESSAGES_SENT_TOTAL.clone()))
        .expect("Failed to register MESSAGES_SENT_TOTAL");
    registry
        .register(Box::new(RECONCILIATIONS_TOTAL.clone()))
        .expect("Failed to register RECONCILIATIONS_TOTAL");
    registry
        .register(Box::new(SEND_ERRORS_TOTAL.clone()))
        .expect("Failed to register SEND_ERRORS_TOTAL");
    registry
        .register(Box::new(HISTORY_REQUEST_DURATION_SECONDS.clone()))
        .expect("Failed to register HISTORY_REQUEST_DURATION_SECONDS");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Metrics should be valid UTF-8")
}

pub fn record_connection_attempt(outcome: &str) {
    CONNECTION_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn set_connection_status(status: ConnectionStatus) {
    let value = match status {
        ConnectionStatus::Disconnected => 0,
        ConnectionStatus::Connecting => 1,
        ConnectionStatus::Connected => 2,
    };
    CONNECTION_STATUS.set(value);
}

pub fn record_inbound_event(event: &str) {
    INBOUND_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

pub fn record_message_sent(emitted: bool) {
    let state = if emitted { "emitted" } else { "offline" };
    MESSAGES_SENT_TOTAL.with_label_values(&[state]).inc();
}

pub fn record_reconciliation(rule: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[rule]).inc();
}

pub fn record_send_error() {
    SEND_ERRORS_TOTAL.inc();
}

/// Helper to record history API request metrics
pub fn record_history_request(operation: &str, success: bool, duration_secs: f64) {
    let outcome = if success { "ok" } else { "error" };
    HISTORY_REQUEST_DURATION_SECONDS
        .with_label_values(&[operation, outcome])
        .observe(duration_secs);
}
