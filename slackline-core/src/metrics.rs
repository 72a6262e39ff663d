// ABOUTME: Metric recording helpers for the relay, approvals and turns.
// ABOUTME: Thin wrappers over the `metrics` facade plus the Prometheus recorder install.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the global Prometheus recorder. Call once at startup.
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// A recorder handle that is not installed globally, for rendering in tests
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Successful `chat.appendStream` calls and the characters they carried
pub fn record_append(chars: usize) {
    metrics::counter!("slackline_stream_appends_total").increment(1);
    metrics::counter!("slackline_stream_chars_total").increment(chars as u64);
}

/// A stream lifecycle call that failed at the transport
pub fn record_stream_failure(operation: &'static str) {
    metrics::counter!("slackline_stream_failures_total", "operation" => operation).increment(1);
}

pub fn record_stream_opened() {
    metrics::counter!("slackline_streams_opened_total").increment(1);
}

/// A batcher flush whose append failed; the text stays buffered
pub fn record_flush_failure() {
    metrics::counter!("slackline_flush_failures_total").increment(1);
}

pub fn record_status_update(cleared: bool) {
    let kind = if cleared { "clear" } else { "set" };
    metrics::counter!("slackline_status_updates_total", "kind" => kind).increment(1);
}

pub fn record_approval_created() {
    metrics::counter!("slackline_approvals_created_total").increment(1);
}

pub fn record_approval_resolved(approved: bool, detached: bool) {
    let decision = if approved { "approved" } else { "rejected" };
    let delivery = if detached { "detached" } else { "live" };
    metrics::counter!(
        "slackline_approvals_resolved_total",
        "decision" => decision,
        "delivery" => delivery
    )
    .increment(1);
}

pub fn set_pending_approvals(count: u64) {
    metrics::gauge!("slackline_pending_approvals").set(count as f64);
}

/// A finished turn, labelled by how it ended
pub fn record_turn(outcome: &'static str, duration: Duration) {
    metrics::counter!("slackline_turns_total", "outcome" => outcome).increment(1);
    metrics::histogram!("slackline_turn_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_tool_used(name: &str) {
    metrics::counter!("slackline_tool_calls_total", "tool" => name.to_string()).increment(1);
}

pub fn record_error(kind: &'static str) {
    metrics::counter!("slackline_errors_total", "kind" => kind).increment(1);
}

/// Inbound HTTP traffic from Slack, labelled by endpoint and result
pub fn record_inbound(endpoint: &'static str, result: &'static str) {
    metrics::counter!(
        "slackline_inbound_requests_total",
        "endpoint" => endpoint,
        "result" => result
    )
    .increment(1);
}

pub fn record_feedback(positive: bool) {
    let sentiment = if positive { "positive" } else { "negative" };
    metrics::counter!("slackline_feedback_total", "sentiment" => sentiment).increment(1);
}
