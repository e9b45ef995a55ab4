//! Prometheus metrics handler

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics exporter
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();

    let handle = builder
        .set_buckets_for_metric(
            Matcher::Full("webhook_duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .unwrap()
        .install_recorder()
        .unwrap();

    // Describe metrics
    describe_counter!(
        "inbound_calls_total",
        "Total number of inbound call webhooks received"
    );
    describe_counter!(
        "rule_decisions_total",
        "Total number of routing rule decisions by resolved action"
    );
    describe_counter!(
        "dial_outcomes_total",
        "Total number of dial-outcome webhooks by reported outcome"
    );
    describe_counter!(
        "warm_transfers_total",
        "Total number of warm-transfer requests by result"
    );
    describe_counter!(
        "signature_rejections_total",
        "Total number of webhooks rejected for an invalid signature"
    );
    describe_histogram!(
        "webhook_duration_seconds",
        "Webhook handling duration in seconds"
    );

    handle
}

/// HTTP metrics handler
pub async fn metrics_handler(
    axum::extract::State(prometheus_handle): axum::extract::State<PrometheusHandle>,
) -> Response {
    let metrics = prometheus_handle.render();
    (StatusCode::OK, metrics).into_response()
}

/// Record an inbound call webhook
pub fn record_inbound_call(recognized: bool) {
    counter!("inbound_calls_total", "recognized" => recognized.to_string()).increment(1);
}

/// Record a routing rule decision
pub fn record_rule_decision(action: &str) {
    counter!("rule_decisions_total", "action" => action.to_string()).increment(1);
}

/// Record a dial-outcome webhook
pub fn record_dial_outcome(outcome: &str) {
    counter!("dial_outcomes_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a warm-transfer request
pub fn record_warm_transfer(accepted: bool) {
    counter!("warm_transfers_total", "accepted" => accepted.to_string()).increment(1);
}

/// Record a rejected webhook signature
pub fn record_signature_rejection(path: &str) {
    counter!("signature_rejections_total", "path" => path.to_string()).increment(1);
}

/// Record webhook handling duration
pub fn record_webhook_duration(path: &str, duration: std::time::Duration) {
    histogram!("webhook_duration_seconds", "path" => path.to_string())
        .record(duration.as_secs_f64());
}

/// Timer for measuring durations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
