//! RFC 7838 Alt-Svc routing for HTTP client transports.
//!
//! [`RoutingTransport`] wraps any [`Transport`], learns alternative services
//! from `Alt-Svc` response headers, and sends later requests for the same
//! origin to the advertised alternate. If the alternate fails, the request is
//! replayed once against its original destination, so wrapping never makes a
//! transport less reliable.

pub mod alt_svc;
pub mod config;
pub mod error;
pub mod observability;
pub mod transport;

pub use alt_svc::{AltServiceRecord, AltSvcHeader, Origin, SecurityPolicy, ServiceCache};
pub use config::{AltSvcConfig, ConfigError, FetchConfig, TransportConfig};
pub use error::{TlsConfigError, TransportError};
pub use transport::{
    AltSvcLayer, Deadline, HttpsTransport, RouteOutcome, RoutingTransport, TlsServerName, Transport,
};
