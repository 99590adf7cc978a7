//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! transport::routing and alt_svc produce:
//!     → tracing events (decisions, failures) inside a per-call span
//!     → metrics.rs (counters, cache gauge)
//!
//! Consumers (binary only):
//!     → logging.rs installs the subscriber (stderr)
//!     → metrics.rs optionally installs the Prometheus exporter
//! ```
//!
//! # Design Decisions
//! - The library only emits; installing subscribers/recorders is the
//!   binary's job
//! - Metric updates are no-ops when no recorder is installed

pub mod logging;
pub mod metrics;
