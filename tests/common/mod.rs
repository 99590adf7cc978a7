//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::http::Version;
use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use bytes::Bytes;
use http::header::HOST;
use http::{Request, Response};

use altsvc_transport::transport::CertificateDer;
use altsvc_transport::{TlsServerName, Transport};

/// What a scripted authority does with a request.
#[derive(Debug, Clone)]
pub enum Script {
    Respond {
        body: String,
        alt_svc: Vec<String>,
    },
    Refuse,
}

/// One request as the scripted transport saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub authority: String,
    pub host_header: Option<String>,
    pub server_name: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptedError {
    #[error("connection refused by {0}")]
    Refused(String),
    #[error("request has no authority")]
    NoAuthority,
}

/// In-memory transport answering per URI authority. Unscripted
/// authorities refuse connections.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, authority: &str, body: &str, alt_svc: &[&str]) {
        self.script(
            authority,
            Script::Respond {
                body: body.to_string(),
                alt_svc: alt_svc.iter().map(|value| value.to_string()).collect(),
            },
        );
    }

    pub fn refuse(&self, authority: &str) {
        self.script(authority, Script::Refuse);
    }

    pub fn script(&self, authority: &str, script: Script) {
        self.scripts.lock().unwrap().insert(authority.to_string(), script);
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// Authorities contacted, in order.
    pub fn authorities(&self) -> Vec<String> {
        self.seen().into_iter().map(|seen| seen.authority).collect()
    }

    pub fn reset_seen(&self) {
        self.seen.lock().unwrap().clear();
    }

    fn handle(&self, request: &Request<Bytes>) -> Result<Response<Bytes>, ScriptedError> {
        let authority = request
            .uri()
            .authority()
            .map(|authority| authority.to_string())
            .ok_or(ScriptedError::NoAuthority)?;
        self.seen.lock().unwrap().push(SeenRequest {
            authority: authority.clone(),
            host_header: request
                .headers()
                .get(HOST)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            server_name: request.extensions().get::<TlsServerName>().map(|name| name.0.clone()),
            path: request.uri().path().to_string(),
        });

        let script = self.scripts.lock().unwrap().get(&authority).cloned();
        match script {
            Some(Script::Respond { body, alt_svc }) => {
                let mut builder = Response::builder().status(200);
                for value in alt_svc {
                    builder = builder.header("alt-svc", value);
                }
                Ok(builder.body(Bytes::from(body)).unwrap())
            }
            Some(Script::Refuse) | None => Err(ScriptedError::Refused(authority)),
        }
    }
}

impl Transport for ScriptedTransport {
    type Error = ScriptedError;

    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>, Self::Error>> + Send {
        let result = self.handle(&request);
        async move { result }
    }
}

pub fn request(uri: &str) -> Request<Bytes> {
    Request::get(uri).body(Bytes::new()).unwrap()
}

pub fn body(response: &Response<Bytes>) -> String {
    String::from_utf8_lossy(response.body()).into_owned()
}

/// Self-signed certificate valid for `example.com`, `127.0.0.1` and `::1`
/// (deliberately not `localhost`).
pub struct TestCert {
    pub cert_pem: String,
    pub key_pem: String,
    pub der: CertificateDer<'static>,
}

pub fn test_cert() -> TestCert {
    let names = vec!["example.com".to_string(), "127.0.0.1".to_string(), "::1".to_string()];
    let certified = rcgen::generate_simple_self_signed(names).unwrap();
    TestCert {
        cert_pem: certified.cert.pem(),
        key_pem: certified.signing_key.serialize_pem(),
        der: CertificateDer::from(certified.cert.der().to_vec()),
    }
}

/// Serve `app` over TLS (h2 + http/1.1) on an ephemeral loopback port.
pub async fn start_tls_server(cert: &TestCert, app: Router) -> SocketAddr {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let config = RustlsConfig::from_pem(
        cert.cert_pem.clone().into_bytes(),
        cert.key_pem.clone().into_bytes(),
    )
    .await
    .unwrap();

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = axum_server::from_tcp_rustls(listener, config)
            .serve(app.into_make_service())
            .await;
    });
    addr
}

/// Origin server: greets with the negotiated protocol and advertises `alt_svc`.
pub fn origin_app(alt_svc: String) -> Router {
    Router::new().route(
        "/",
        get(move |version: Version| {
            let alt_svc = alt_svc.clone();
            async move { ([("alt-svc", alt_svc)], format!("Hello, {version:?}")) }
        }),
    )
}

/// Alternate server: greets with the negotiated protocol.
pub fn alternate_app() -> Router {
    Router::new().route(
        "/",
        get(|version: Version| async move { format!("Hello alternate, {version:?}") }),
    )
}
