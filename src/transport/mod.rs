//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! Caller
//!     → routing.rs (RoutingTransport: lookup, rewrite, fallback, observe)
//!     → any Transport (HttpsTransport in client.rs, or a caller's own)
//!     → tls.rs (rustls client config shared by HttpsTransport)
//!
//! Per-call states:
//!     DIRECT | REWRITTEN → (failure) → FALLBACK
//! ```
//!
//! # Design Decisions
//! - `Transport` is the narrow "one request in, one response or error out"
//!   capability; the routing transport implements it too, so it substitutes
//!   anywhere the base transport is used
//! - Bodies are buffered (`Bytes`) so the original request can be replayed
//!   on fallback
//! - TLS identity overrides travel as request extensions

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::{Request, Response};

pub mod client;
pub mod layer;
pub mod routing;
pub mod tls;

pub use client::HttpsTransport;
pub use layer::AltSvcLayer;
pub use routing::{RouteOutcome, RoutingTransport, RoutingTransportBuilder};
pub use rustls::pki_types::CertificateDer;

/// Execute one HTTP request and return one response or error.
pub trait Transport: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>, Self::Error>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    type Error = T::Error;

    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>, Self::Error>> + Send {
        (**self).execute(request)
    }
}

/// Request extension: the name to verify the peer certificate against,
/// overriding the transport's configured name and the URI host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsServerName(pub String);

/// Request extension: the caller gives up on the request at this instant.
/// Once passed, the routing transport starts no fallback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(pub Instant);

impl Deadline {
    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.0
    }
}
