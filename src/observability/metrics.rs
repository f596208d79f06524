//! Metrics collection and exposition.
//!
//! # Metrics
//! - `registry_registrations_total` (counter)
//! - `registry_heartbeats_total` (counter): labelled `renewed`
//! - `registry_deregistrations_total` (counter)
//! - `registry_evictions_total` (counter)
//! - `registry_instances` (gauge): live instances across all applications
//! - `breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `breaker_transitions_total` (counter): labelled `breaker`, `to`
//! - `breaker_rejections_total` (counter)
//! - `retry_attempts_total` (counter)
//! - `rate_limited_total` (counter): labelled `scope`
//!
//! Recording is a no-op until [`init_metrics`] installs a recorder.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_registration(app_id: &str) {
    counter!("registry_registrations_total", "app" => app_id.to_string()).increment(1);
}

pub fn record_heartbeat(renewed: bool) {
    counter!("registry_heartbeats_total", "renewed" => if renewed { "true" } else { "false" })
        .increment(1);
}

pub fn record_deregistration(app_id: &str) {
    counter!("registry_deregistrations_total", "app" => app_id.to_string()).increment(1);
}

pub fn record_evictions(count: usize) {
    counter!("registry_evictions_total").increment(count as u64);
}

pub fn record_instance_count(count: usize) {
    gauge!("registry_instances").set(count as f64);
}

pub fn record_breaker_transition(breaker: &str, to: CircuitState) {
    let value = match to {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    };
    gauge!("breaker_state", "breaker" => breaker.to_string()).set(value);
    counter!(
        "breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
}

pub fn record_breaker_rejection(breaker: &str) {
    counter!("breaker_rejections_total", "breaker" => breaker.to_string()).increment(1);
}

pub fn record_retry_attempt() {
    counter!("retry_attempts_total").increment(1);
}

pub fn record_rate_limited(scope: &'static str) {
    counter!("rate_limited_total", "scope" => scope).increment(1);
}
