//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain connection status
//! - Correlation outcomes and latency
//! - Destination relay scans

use crate::chain::{Direction, Layer};
use crate::error::CorrelatorError;

use anyhow::{Context, Result};
use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "xdomain_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)",
        &["chain_id"]
    ).unwrap();

    pub static ref DESTINATION_POLLS: CounterVec = register_counter_vec!(
        "xdomain_destination_polls_total",
        "Relay scans issued against a destination chain",
        &["layer"]
    ).unwrap();

    // Correlation metrics
    pub static ref CORRELATIONS_STARTED: CounterVec = register_counter_vec!(
        "xdomain_correlations_started_total",
        "Total correlations started",
        &["direction"]
    ).unwrap();

    pub static ref CORRELATIONS_COMPLETED: CounterVec = register_counter_vec!(
        "xdomain_correlations_completed_total",
        "Total correlations that observed the relay",
        &["direction"]
    ).unwrap();

    pub static ref CORRELATIONS_FAILED: CounterVec = register_counter_vec!(
        "xdomain_correlations_failed_total",
        "Total failed correlations by failing stage and error kind",
        &["direction", "stage", "kind"]
    ).unwrap();

    pub static ref CORRELATION_LATENCY: HistogramVec = register_histogram_vec!(
        "xdomain_correlation_latency_seconds",
        "Time from submission to observed relay",
        &["direction"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> Result<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind metrics server to {}", addr))?;
        axum::serve(listener, app)
            .await
            .context("Metrics server stopped")?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    render().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Text exposition of every registered metric
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

// Helper functions to record metrics

pub fn record_chain_health(chain_id: u64, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[&chain_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_destination_poll(layer: Layer) {
    DESTINATION_POLLS.with_label_values(&[layer.name()]).inc();
}

pub fn record_correlation_started(direction: Direction) {
    CORRELATIONS_STARTED
        .with_label_values(&[direction.name()])
        .inc();
}

pub fn record_correlation_completed(direction: Direction, latency_secs: f64) {
    CORRELATIONS_COMPLETED
        .with_label_values(&[direction.name()])
        .inc();
    CORRELATION_LATENCY
        .with_label_values(&[direction.name()])
        .observe(latency_secs);
}

pub fn record_correlation_failed(direction: Direction, error: &CorrelatorError) {
    let stage = error.failed_stage().map(|s| s.as_str()).unwrap_or("none");
    CORRELATIONS_FAILED
        .with_label_values(&[direction.name(), stage, error.kind()])
        .inc();
}
