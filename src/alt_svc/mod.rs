//! Alt-Svc (RFC 7838) handling subsystem.
//!
//! # Data Flow
//! ```text
//! Response from origin carrying `Alt-Svc`
//!     → parser.rs (header value → candidate records)
//!     → policy.rs (same-host / loopback trust check, h2 selection)
//!     → cache.rs (one active record per origin, lazy expiry, quarantine)
//!
//! Next request to the same origin:
//!     → cache.rs lookup
//!     → policy.rs re-check
//!     → transport::routing rewrites the destination
//! ```
//!
//! # Design Decisions
//! - Parsing never fails as a whole; bad entries are skipped
//! - Policy rejections are silent (debug log + metric only)
//! - Expiry is checked on read; there is no background sweep

pub mod cache;
pub mod parser;
pub mod policy;
pub mod record;

pub use cache::ServiceCache;
pub use parser::{parse, AltSvcHeader, DEFAULT_MAX_AGE_SECS};
pub use policy::SecurityPolicy;
pub use record::{AltServiceRecord, Origin, H2};
