//! HTTPS base transport.
//!
//! # Responsibilities
//! - Connect to the request URI's authority (TCP, then rustls for `https`)
//! - Verify the peer against the per-request [`TlsServerName`], else the
//!   configured server name, else the URI host
//! - Speak HTTP/2 when ALPN selects `h2`, HTTP/1.1 otherwise
//! - Buffer the response body
//!
//! # Design Decisions
//! - One connection per request; pooling belongs to a richer client
//! - A `Host` header on the request is the authority the server sees
//!   (`:authority` on HTTP/2), independent of where the socket connects
//! - Connect and request timeouts use Tokio's timeout facilities

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderValue, HOST};
use http::uri::{Authority, PathAndQuery};
use http::{Request, Response, Uri, Version};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::pki_types::{CertificateDer, ServerName};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use crate::alt_svc::record::default_port;
use crate::config::TransportConfig;
use crate::error::{TlsConfigError, TransportError};
use crate::transport::{tls, TlsServerName, Transport};

/// Transport over tokio + rustls + hyper.
#[derive(Clone)]
pub struct HttpsTransport {
    connector: TlsConnector,
    server_name: Option<String>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl std::fmt::Debug for HttpsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpsTransport")
            .field("server_name", &self.server_name)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl HttpsTransport {
    /// Build from configuration, trusting web PKI roots plus
    /// `config.extra_root_certs`.
    pub fn new(config: &TransportConfig) -> Result<Self, TlsConfigError> {
        Self::with_extra_roots(config, Vec::new())
    }

    /// Like [`new`](Self::new), additionally trusting `roots`.
    pub fn with_extra_roots(
        config: &TransportConfig,
        roots: impl IntoIterator<Item = CertificateDer<'static>>,
    ) -> Result<Self, TlsConfigError> {
        let mut store = tls::root_store(&config.extra_root_certs)?;
        for cert in roots {
            store.add(cert)?;
        }
        let tls_config = tls::client_config(store)?;
        Ok(Self {
            connector: TlsConnector::from(Arc::new(tls_config)),
            server_name: config.server_name.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    /// Server name verified when no per-request override is present.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    pub fn set_server_name(&mut self, name: Option<String>) {
        self.server_name = name;
    }

    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let uri = request.uri();
        let scheme = uri
            .scheme_str()
            .ok_or_else(|| TransportError::InvalidUri(format!("{uri}: missing scheme")))?
            .to_ascii_lowercase();
        let host = uri
            .host()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TransportError::InvalidUri(format!("{uri}: missing host")))?;
        let port = uri
            .port_u16()
            .or_else(|| default_port(&scheme))
            .ok_or_else(|| TransportError::InvalidUri(format!("{uri}: unsupported scheme")))?;

        let tcp = timeout(self.connect_timeout, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|_| TransportError::ConnectTimeout)?
            .map_err(TransportError::Connect)?;
        if let Err(error) = tcp.set_nodelay(true) {
            tracing::trace!(error = %error, port, "Failed to set TCP_NODELAY");
        }

        if scheme != "https" {
            return send_http1(TokioIo::new(tcp), request).await;
        }

        let name = request
            .extensions()
            .get::<TlsServerName>()
            .map(|name| name.0.clone())
            .or_else(|| self.server_name.clone())
            .unwrap_or(host);
        let server_name = ServerName::try_from(name.clone())
            .map_err(|_| TransportError::InvalidServerName(name.clone()))?;

        let stream = timeout(self.connect_timeout, self.connector.connect(server_name, tcp))
            .await
            .map_err(|_| TransportError::ConnectTimeout)?
            .map_err(TransportError::Tls)?;
        tracing::trace!(server_name = %name, port, "TLS established");

        let negotiated_h2 = stream.get_ref().1.alpn_protocol() == Some(&b"h2"[..]);
        if negotiated_h2 {
            send_http2(TokioIo::new(stream), request).await
        } else {
            send_http1(TokioIo::new(stream), request).await
        }
    }
}

impl Transport for HttpsTransport {
    type Error = TransportError;

    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl std::future::Future<Output = Result<Response<Bytes>, Self::Error>> + Send {
        async move {
            match timeout(self.request_timeout, self.send(request)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::RequestTimeout),
            }
        }
    }
}

async fn send_http2<I>(io: I, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError>
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, connection) = hyper::client::conn::http2::handshake(TokioExecutor::new(), io)
        .await
        .map_err(TransportError::Handshake)?;
    tokio::spawn(async move {
        if let Err(error) = connection.await {
            tracing::debug!(error = %error, "HTTP/2 connection closed with error");
        }
    });

    let response = sender
        .send_request(http2_request(request)?)
        .await
        .map_err(TransportError::Request)?;
    collect(response).await
}

async fn send_http1<I>(io: I, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError>
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, connection) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(TransportError::Handshake)?;
    tokio::spawn(async move {
        if let Err(error) = connection.await {
            tracing::debug!(error = %error, "HTTP/1.1 connection closed with error");
        }
    });

    let response = sender
        .send_request(http1_request(request)?)
        .await
        .map_err(TransportError::Request)?;
    collect(response).await
}

/// HTTP/2 carries the origin in `:authority`, taken from the `Host` header
/// when one is present.
fn http2_request(request: Request<Bytes>) -> Result<Request<Full<Bytes>>, TransportError> {
    let (mut parts, body) = request.into_parts();
    if let Some(host) = parts.headers.remove(HOST) {
        let authority = host
            .to_str()
            .ok()
            .and_then(|host| Authority::try_from(host).ok())
            .ok_or_else(|| TransportError::InvalidUri(format!("invalid Host header {host:?}")))?;
        let mut uri_parts = parts.uri.into_parts();
        uri_parts.authority = Some(authority);
        parts.uri = Uri::from_parts(uri_parts)
            .map_err(|error| TransportError::InvalidUri(error.to_string()))?;
    }
    parts.version = Version::HTTP_2;
    Ok(Request::from_parts(parts, Full::new(body)))
}

/// HTTP/1.1 sends origin-form targets with an explicit `Host` header.
fn http1_request(request: Request<Bytes>) -> Result<Request<Full<Bytes>>, TransportError> {
    let (mut parts, body) = request.into_parts();
    if !parts.headers.contains_key(HOST) {
        if let Some(authority) = parts.uri.authority() {
            let host = HeaderValue::from_str(authority.as_str())
                .map_err(|error| TransportError::InvalidUri(error.to_string()))?;
            parts.headers.insert(HOST, host);
        }
    }
    let path = parts
        .uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    let mut target = http::uri::Parts::default();
    target.path_and_query = Some(path);
    parts.uri = Uri::from_parts(target).map_err(|error| TransportError::InvalidUri(error.to_string()))?;
    parts.version = Version::HTTP_11;
    Ok(Request::from_parts(parts, Full::new(body)))
}

async fn collect(
    response: Response<hyper::body::Incoming>,
) -> Result<Response<Bytes>, TransportError> {
    let (parts, body) = response.into_parts();
    let body = body.collect().await.map_err(TransportError::Body)?.to_bytes();
    Ok(Response::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request<Bytes> {
        Request::get(uri).body(Bytes::new()).unwrap()
    }

    #[test]
    fn http2_uses_host_header_as_authority() {
        let mut req = request("https://localhost:9443/api?x=1");
        req.headers_mut().insert(HOST, HeaderValue::from_static("localhost:8443"));

        let req = http2_request(req).unwrap();
        assert_eq!(req.uri().to_string(), "https://localhost:8443/api?x=1");
        assert!(req.headers().get(HOST).is_none());
        assert_eq!(req.version(), Version::HTTP_2);
    }

    #[test]
    fn http2_keeps_uri_without_host_header() {
        let req = http2_request(request("https://example.com/")).unwrap();
        assert_eq!(req.uri().authority().unwrap().as_str(), "example.com");
    }

    #[test]
    fn http1_uses_origin_form() {
        let req = http1_request(request("http://example.com:8080/a/b?c")).unwrap();
        assert_eq!(req.uri().to_string(), "/a/b?c");
        assert_eq!(req.headers()[HOST], "example.com:8080");
        assert_eq!(req.version(), Version::HTTP_11);
    }

    #[test]
    fn http1_keeps_existing_host_header() {
        let mut req = request("http://127.0.0.1:8080/");
        req.headers_mut().insert(HOST, HeaderValue::from_static("example.com"));
        let req = http1_request(req).unwrap();
        assert_eq!(req.headers()[HOST], "example.com");
    }

    #[tokio::test]
    async fn relative_uri_is_rejected() {
        let transport = HttpsTransport::new(&TransportConfig::default()).unwrap();
        let err = transport.execute(request("/no-authority")).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidUri(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        // bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = HttpsTransport::new(&TransportConfig::default()).unwrap();
        let err = transport
            .execute(request(&format!("http://127.0.0.1:{port}/")))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
    }
}
