//! Alt-Svc routing decorator.
//!
//! # Responsibilities
//! - Rewrite requests to a cached, trusted alternate (REWRITTEN)
//! - Fall back to the original destination exactly once when the alternate
//!   fails (FALLBACK), quarantining the alternate
//! - Learn alternates from `Alt-Svc` headers on every successful response
//!
//! # State Transitions
//! ```text
//! no record / rejected ──────────────▶ DIRECT ──▶ Direct(result)
//! record accepted ──▶ REWRITTEN ──ok──▶ Rewritten(response)
//!                         │
//!                        err ──deadline passed──▶ Abandoned(err)
//!                         │
//!                         ▼
//!                     FALLBACK ──ok──▶ FallbackSucceeded(response)
//!                              └─err─▶ FallbackFailed(err)
//! ```
//!
//! # Design Decisions
//! - At most two network attempts per call; no retry loop
//! - Errors are the wrapped transport's own, never wrapped
//! - The `Host` header keeps the origin's authority on rewritten requests
//!   (RFC 7838 §2.4)

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::{HeaderValue, HOST};
use http::uri::Authority;
use http::{Request, Response, Uri};
use tracing::Instrument;
use uuid::Uuid;

use crate::alt_svc::cache::ServiceCache;
use crate::alt_svc::parser::{self, AltSvcHeader};
use crate::alt_svc::policy::SecurityPolicy;
use crate::alt_svc::record::{AltServiceRecord, Origin};
use crate::config::{validate_alt_svc, AltSvcConfig, ConfigError};
use crate::observability::metrics;
use crate::transport::{Deadline, TlsServerName, Transport};

/// Response header carrying alternative service advertisements.
pub const ALT_SVC: &str = "alt-svc";

/// How a single call was served.
#[derive(Debug)]
pub enum RouteOutcome<E> {
    /// No usable alternate; the request went to its own destination.
    Direct(Result<Response<Bytes>, E>),
    /// The alternate answered.
    Rewritten(Response<Bytes>),
    /// The alternate failed; the original destination answered.
    FallbackSucceeded(Response<Bytes>),
    /// The alternate failed and so did the original destination. Carries the
    /// original destination's error.
    FallbackFailed(E),
    /// The alternate failed after the request's [`Deadline`]; no fallback was
    /// attempted. Carries the alternate's error.
    Abandoned(E),
}

impl<E> RouteOutcome<E> {
    /// Collapse into what the caller of a plain transport would see.
    pub fn into_result(self) -> Result<Response<Bytes>, E> {
        match self {
            RouteOutcome::Direct(result) => result,
            RouteOutcome::Rewritten(response) | RouteOutcome::FallbackSucceeded(response) => {
                Ok(response)
            }
            RouteOutcome::FallbackFailed(error) | RouteOutcome::Abandoned(error) => Err(error),
        }
    }

    /// Stable name used in logs and metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            RouteOutcome::Direct(_) => "direct",
            RouteOutcome::Rewritten(_) => "rewritten",
            RouteOutcome::FallbackSucceeded(_) => "fallback_succeeded",
            RouteOutcome::FallbackFailed(_) => "fallback_failed",
            RouteOutcome::Abandoned(_) => "abandoned",
        }
    }
}

struct Shared<T> {
    base: T,
    config: AltSvcConfig,
    policy: SecurityPolicy,
    cache: ServiceCache,
}

/// Transport decorator that follows `Alt-Svc` advertisements.
///
/// Cheap to clone; clones share the cache.
pub struct RoutingTransport<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for RoutingTransport<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport> RoutingTransport<T> {
    /// Wrap `base`, validating `config` first.
    pub fn new(base: T, config: AltSvcConfig) -> Result<Self, ConfigError> {
        validate_alt_svc(&config).map_err(ConfigError::Validation)?;
        Ok(Self::from_validated(base, config))
    }

    /// Start a builder with default configuration.
    pub fn builder(base: T) -> RoutingTransportBuilder<T> {
        RoutingTransportBuilder {
            base,
            config: AltSvcConfig::default(),
        }
    }

    pub(crate) fn from_validated(base: T, config: AltSvcConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                policy: SecurityPolicy::new(&config),
                cache: ServiceCache::new(config.max_origins),
                base,
                config,
            }),
        }
    }

    pub fn config(&self) -> &AltSvcConfig {
        &self.shared.config
    }

    /// The cache of learned alternates.
    pub fn cache(&self) -> &ServiceCache {
        &self.shared.cache
    }

    /// The wrapped transport.
    pub fn get_ref(&self) -> &T {
        &self.shared.base
    }

    /// Send `request`, reporting which path served it.
    pub async fn route(&self, request: Request<Bytes>) -> RouteOutcome<T::Error> {
        let span = tracing::debug_span!(
            "alt_svc_route",
            call_id = %Uuid::new_v4(),
            method = %request.method(),
            uri = %request.uri(),
        );
        let outcome = self.route_inner(request).instrument(span).await;
        metrics::record_route(outcome.label());
        outcome
    }

    async fn route_inner(&self, request: Request<Bytes>) -> RouteOutcome<T::Error> {
        let shared = &self.shared;

        let Some(origin) = Origin::from_uri(request.uri()) else {
            tracing::trace!("Request has no origin, sending direct");
            return RouteOutcome::Direct(shared.base.execute(request).await);
        };

        let alternate = shared
            .cache
            .lookup(&origin)
            .filter(|record| record.is_h2() && shared.policy.accept(&origin, record));
        let rewritten = alternate.and_then(|record| {
            let rewritten = self.rewrite(&request, &origin, &record)?;
            Some((record, rewritten))
        });
        let Some((record, rewritten)) = rewritten else {
            return RouteOutcome::Direct(self.send_and_observe(&origin, request).await);
        };

        tracing::debug!(
            origin = %origin,
            alternate = %record.authority(),
            "Routing request to alternate service"
        );
        let error = match shared.base.execute(rewritten).await {
            Ok(response) => {
                self.observe(&origin, &response);
                return RouteOutcome::Rewritten(response);
            }
            Err(error) => error,
        };

        tracing::warn!(
            origin = %origin,
            alternate = %record.authority(),
            error = %error,
            "Alternate service failed, falling back to origin"
        );
        metrics::record_alternate_failure();
        shared.cache.quarantine(&origin, &record);
        metrics::record_cache_size(shared.cache.len());

        if request.extensions().get::<Deadline>().is_some_and(Deadline::is_elapsed) {
            tracing::debug!(origin = %origin, "Deadline passed, not falling back");
            return RouteOutcome::Abandoned(error);
        }

        match self.send_and_observe(&origin, request).await {
            Ok(response) => RouteOutcome::FallbackSucceeded(response),
            Err(error) => RouteOutcome::FallbackFailed(error),
        }
    }

    async fn send_and_observe(
        &self,
        origin: &Origin,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, T::Error> {
        let response = self.shared.base.execute(request).await?;
        self.observe(origin, &response);
        Ok(response)
    }

    /// Copy of `request` addressed to `record`'s authority.
    fn rewrite(
        &self,
        request: &Request<Bytes>,
        origin: &Origin,
        record: &AltServiceRecord,
    ) -> Option<Request<Bytes>> {
        let mut parts = request.uri().clone().into_parts();
        parts.authority = Some(Authority::from_str(&record.authority()).ok()?);
        let uri = match Uri::from_parts(parts) {
            Ok(uri) => uri,
            Err(error) => {
                tracing::debug!(origin = %origin, error = %error, "Cannot rewrite request URI");
                return None;
            }
        };

        let mut rewritten = Request::new(request.body().clone());
        *rewritten.method_mut() = request.method().clone();
        *rewritten.uri_mut() = uri;
        *rewritten.version_mut() = request.version();
        *rewritten.headers_mut() = request.headers().clone();
        *rewritten.extensions_mut() = request.extensions().clone();

        if !rewritten.headers().contains_key(HOST) {
            let host = request
                .uri()
                .authority()
                .and_then(|authority| HeaderValue::from_str(authority.as_str()).ok());
            if let Some(host) = host {
                rewritten.headers_mut().insert(HOST, host);
            }
        }
        if let Some(name) = &self.shared.config.alternative_server_name {
            rewritten.extensions_mut().insert(TlsServerName(name.clone()));
        }
        Some(rewritten)
    }

    /// Learn from the `Alt-Svc` fields of a successful response.
    fn observe(&self, origin: &Origin, response: &Response<Bytes>) {
        let values: Vec<&str> = response
            .headers()
            .get_all(ALT_SVC)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        if values.is_empty() {
            return;
        }

        let shared = &self.shared;
        let now = Instant::now();
        match parser::parse(&values.join(", "), origin, now, shared.config.default_max_age_secs) {
            AltSvcHeader::Clear => {
                tracing::debug!(origin = %origin, "Alt-Svc clear, forgetting alternate");
                shared.cache.clear(origin);
            }
            AltSvcHeader::Services(candidates) => {
                let selected = candidates.into_iter().filter(|c| c.is_h2()).find(|candidate| {
                    if !shared.policy.accept(origin, candidate) {
                        tracing::debug!(
                            origin = %origin,
                            alternate = %candidate.authority(),
                            "Alt-Svc candidate rejected by policy"
                        );
                        metrics::record_policy_rejection();
                        return false;
                    }
                    if shared.cache.is_quarantined_at(origin, candidate, now) {
                        tracing::trace!(
                            origin = %origin,
                            alternate = %candidate.authority(),
                            "Alt-Svc candidate quarantined"
                        );
                        return false;
                    }
                    true
                });

                if let Some(record) = selected {
                    let alternate = record.authority();
                    if shared.cache.store_unless_quarantined(origin.clone(), record, now) {
                        tracing::debug!(origin = %origin, alternate = %alternate, "Stored alternate service");
                        metrics::record_stored();
                    }
                }
            }
        }
        metrics::record_cache_size(shared.cache.len());
    }
}

impl<T: Transport> Transport for RoutingTransport<T> {
    type Error = T::Error;

    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl std::future::Future<Output = Result<Response<Bytes>, Self::Error>> + Send {
        async move { self.route(request).await.into_result() }
    }
}

/// Order-independent options for [`RoutingTransport`].
pub struct RoutingTransportBuilder<T> {
    base: T,
    config: AltSvcConfig,
}

impl<T: Transport> RoutingTransportBuilder<T> {
    /// Verify alternates against `name` instead of the base transport's
    /// TLS server name.
    pub fn alternative_server_name(mut self, name: impl Into<String>) -> Self {
        self.config.alternative_server_name = Some(name.into());
        self
    }

    /// Trust loopback alternates advertised by any origin.
    pub fn localhost_allowed(mut self) -> Self {
        self.config.localhost_allowed = true;
        self
    }

    /// Max-age for entries without `ma`.
    pub fn default_max_age_secs(mut self, secs: u64) -> Self {
        self.config.default_max_age_secs = secs;
        self
    }

    /// Bound on cached origins.
    pub fn max_origins(mut self, max_origins: usize) -> Self {
        self.config.max_origins = max_origins;
        self
    }

    /// Replace every option at once.
    pub fn config(mut self, config: AltSvcConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<RoutingTransport<T>, ConfigError> {
        RoutingTransport::new(self.base, self.config)
    }
}
