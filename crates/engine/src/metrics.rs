//! Thin wrapper around the `metrics` crate facade.
//!
//! Every function here is infallible and side-effect-only: the `metrics`
//! crate silently no-ops when no recorder has been installed, so emission
//! never panics or blocks executor progress regardless of whether the host
//! application wired up a real exporter.

use std::time::Duration;

pub fn execution_started() {
    metrics::counter!("executions_started").increment(1);
}

pub fn execution_succeeded(duration: Duration) {
    metrics::counter!("executions_succeeded").increment(1);
    metrics::histogram!("execution_duration_seconds").record(duration.as_secs_f64());
}

pub fn execution_failed(duration: Duration) {
    metrics::counter!("executions_failed").increment(1);
    metrics::histogram!("execution_duration_seconds").record(duration.as_secs_f64());
}

pub fn execution_cancelled(duration: Duration) {
    metrics::counter!("executions_cancelled").increment(1);
    metrics::histogram!("execution_duration_seconds").record(duration.as_secs_f64());
}

pub fn node_started() {
    metrics::counter!("nodes_started").increment(1);
}

pub fn node_succeeded(duration: Duration) {
    metrics::counter!("nodes_succeeded").increment(1);
    metrics::histogram!("node_duration_seconds").record(duration.as_secs_f64());
}

pub fn node_failed(duration: Duration) {
    metrics::counter!("nodes_failed").increment(1);
    metrics::histogram!("node_duration_seconds").record(duration.as_secs_f64());
}

pub fn node_retried() {
    metrics::counter!("nodes_retried").increment(1);
}

pub fn retry_successful() {
    metrics::counter!("retries_successful").increment(1);
}

pub fn scheduler_misfire() {
    metrics::counter!("scheduler_misfires").increment(1);
}

pub fn event_dropped() {
    metrics::counter!("event_drops").increment(1);
}
