//! Metrics collection and exposition.
//!
//! # Metrics
//! - `altsvc_requests_total` (counter): calls by `route`
//!   (direct, rewritten, fallback_succeeded, fallback_failed, abandoned)
//! - `altsvc_records_stored_total` (counter): accepted advertisements
//! - `altsvc_policy_rejections_total` (counter): untrusted candidates
//! - `altsvc_alternate_failures_total` (counter): failed alternate attempts
//! - `altsvc_cache_origins` (gauge): origins with a cached alternate

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve it on `addr`.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_route(route: &'static str) {
    metrics::counter!("altsvc_requests_total", "route" => route).increment(1);
}

pub fn record_stored() {
    metrics::counter!("altsvc_records_stored_total").increment(1);
}

pub fn record_policy_rejection() {
    metrics::counter!("altsvc_policy_rejections_total").increment(1);
}

pub fn record_alternate_failure() {
    metrics::counter!("altsvc_alternate_failures_total").increment(1);
}

pub fn record_cache_size(origins: usize) {
    metrics::gauge!("altsvc_cache_origins").set(origins as f64);
}
