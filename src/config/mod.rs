//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → FetchConfig (validated, immutable)
//!     → AltSvcConfig moved into the RoutingTransport, TransportConfig into
//!       the HttpsTransport
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a transport is built from it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{AltSvcConfig, FetchConfig, ObservabilityConfig, TransportConfig};
pub use validation::{validate_alt_svc, validate_config, ValidationError};
