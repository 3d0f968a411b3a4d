//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define router metrics (requests, render latency, fetch dedup, prefetch, navigation)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `router_requests_total` (counter): requests by method, status, route
//! - `router_request_duration_seconds` (histogram): transport latency by route
//! - `router_render_duration_seconds` (histogram): shell latency by route, status
//! - `router_fetches_total` (counter): distinct fetches issued
//! - `router_fetch_dedup_total` (counter): fetches served by an in-flight request
//! - `router_prefetch_total` (counter): prefetch outcomes
//! - `router_navigations_total` (counter): client navigation outcomes
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users
//!   and tests pay nothing
//! - Route labels use the route pattern (`/blog/[slug]`), never the raw path

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    counter!(
        "router_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    histogram!("router_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_render(route: &str, status: &'static str, start: Instant) {
    histogram!(
        "router_render_duration_seconds",
        "route" => route.to_string(),
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_fetch(deduplicated: bool) {
    if deduplicated {
        counter!("router_fetch_dedup_total").increment(1);
    } else {
        counter!("router_fetches_total").increment(1);
    }
}

/// `outcome`: stored, hit, stale, discarded, failed.
pub fn record_prefetch(outcome: &'static str) {
    counter!("router_prefetch_total", "outcome" => outcome).increment(1);
}

/// `outcome`: committed, traversed, refreshed, superseded, failed.
pub fn record_navigation(outcome: &'static str) {
    counter!("router_navigations_total", "outcome" => outcome).increment(1);
}
