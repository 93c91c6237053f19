//! Metrics collection and exposition.
//!
//! # Metrics
//! - `router_instance_health` (gauge): latest score per instance
//! - `router_health_checks_total` (counter): probes by instance, outcome
//! - `router_instance_switches_total` (counter): published changes by reason
//! - `router_failovers_total` (counter): failover attempts by outcome
//! - `router_no_healthy_instance_total` (counter): empty selections
//! - `router_monitors_active` (gauge): running health monitors
//! - `router_registry_polls_total` (counter): registry polls by outcome
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_instance_health(instance: &str, score: f64) {
    gauge!("router_instance_health", "instance" => instance.to_string()).set(score);
}

pub fn record_health_check(instance: &str, outcome: &'static str) {
    counter!("router_health_checks_total", "instance" => instance.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_instance_switch(reason: &'static str) {
    counter!("router_instance_switches_total", "reason" => reason).increment(1);
}

pub fn record_failover(outcome: &'static str) {
    counter!("router_failovers_total", "outcome" => outcome).increment(1);
}

pub fn record_no_healthy_instance() {
    counter!("router_no_healthy_instance_total").increment(1);
}

pub fn record_monitors_active(count: usize) {
    gauge!("router_monitors_active").set(count as f64);
}

pub fn record_registry_poll(outcome: &'static str) {
    counter!("router_registry_polls_total", "outcome" => outcome).increment(1);
}
