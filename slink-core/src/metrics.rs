// ABOUTME: Metrics recording helpers over the `metrics` facade
// ABOUTME: Prometheus exporter installation for the binary

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter with an HTTP listener on `addr`
pub fn init_metrics(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    tracing::info!(addr = %addr, "Metrics exporter listening");
    Ok(())
}

/// An inbound event was taken off the stream
pub fn record_event(kind: &'static str) {
    counter!("slink_events_total", "kind" => kind).increment(1);
}

/// A message event was classified; outcome is "dispatched" or a suppression reason
pub fn record_message(outcome: &'static str) {
    counter!("slink_messages_total", "outcome" => outcome).increment(1);
}

/// A directory category refresh finished
pub fn record_refresh(category: &'static str, success: bool) {
    let outcome = if success { "ok" } else { "error" };
    counter!("slink_directory_refresh_total", "category" => category, "outcome" => outcome)
        .increment(1);
}

pub fn set_directory_size(category: &'static str, size: usize) {
    gauge!("slink_directory_entities", "category" => category).set(size as f64);
}

/// An outbound send finished; outcome is "sent", "not_found" or "error"
pub fn record_outbound(outcome: &'static str) {
    counter!("slink_outbound_total", "outcome" => outcome).increment(1);
}
