//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::alt_svc::parser::DEFAULT_MAX_AGE_SECS;

/// Root configuration for the `altsvc-fetch` client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FetchConfig {
    /// Alt-Svc routing behaviour.
    pub alt_svc: AltSvcConfig,

    /// Base HTTPS transport settings.
    pub transport: TransportConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Alt-Svc routing configuration. Shared read-only by all requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AltSvcConfig {
    /// TLS server name to verify when a request is routed to an alternate.
    /// When unset the base transport's own server name applies.
    pub alternative_server_name: Option<String>,

    /// Also trust alternates on `localhost`, `127.0.0.1` and `::1`.
    pub localhost_allowed: bool,

    /// Max-age used for entries without an `ma` parameter.
    pub default_max_age_secs: u64,

    /// Upper bound on the number of origins with a cached alternate.
    pub max_origins: usize,
}

impl Default for AltSvcConfig {
    fn default() -> Self {
        Self {
            alternative_server_name: None,
            localhost_allowed: false,
            default_max_age_secs: DEFAULT_MAX_AGE_SECS,
            max_origins: 10_000,
        }
    }
}

/// Base transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// TLS server name used instead of the URI host for every request.
    pub server_name: Option<String>,

    /// PEM files with additional trusted root certificates.
    pub extra_root_certs: Vec<PathBuf>,

    /// TCP connect + TLS handshake timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Whole-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            server_name: None,
            extra_root_certs: Vec::new(),
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
