//! Error types of the base HTTPS transport.
//!
//! The routing layer defines no error of its own: it returns whatever error
//! the transport it wraps produced.

use std::path::PathBuf;

/// Failure of a single request through [`HttpsTransport`](crate::transport::HttpsTransport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid request URI: {0}")]
    InvalidUri(String),

    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),

    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("TLS handshake failed: {0}")]
    Tls(#[source] std::io::Error),

    #[error("connect timed out")]
    ConnectTimeout,

    #[error("request timed out")]
    RequestTimeout,

    #[error("HTTP handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("request failed: {0}")]
    Request(#[source] hyper::Error),

    #[error("reading response body failed: {0}")]
    Body(#[source] hyper::Error),
}

/// Failure to assemble the client TLS configuration.
#[derive(Debug, thiserror::Error)]
pub enum TlsConfigError {
    #[error("certificate file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates in {0:?}")]
    NoCertificates(PathBuf),

    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}
