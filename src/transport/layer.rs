//! Tower integration.
//!
//! `AltSvcLayer` wraps any [`Transport`] in a [`RoutingTransport`], and
//! `RoutingTransport` is itself a `tower::Service`, so it stacks with other
//! tower middleware.

use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{Request, Response};
use tower::{Layer, Service};

use crate::config::{validate_alt_svc, AltSvcConfig, ConfigError};
use crate::transport::routing::RoutingTransport;
use crate::transport::Transport;

/// Layer producing a [`RoutingTransport`] around the inner transport.
#[derive(Debug, Clone)]
pub struct AltSvcLayer {
    config: AltSvcConfig,
}

impl AltSvcLayer {
    /// Validates `config` once; every transport built by this layer shares it.
    pub fn new(config: AltSvcConfig) -> Result<Self, ConfigError> {
        validate_alt_svc(&config).map_err(ConfigError::Validation)?;
        Ok(Self { config })
    }
}

impl<T: Transport> Layer<T> for AltSvcLayer {
    type Service = RoutingTransport<T>;

    fn layer(&self, inner: T) -> Self::Service {
        RoutingTransport::from_validated(inner, self.config.clone())
    }
}

impl<T: Transport> Service<Request<Bytes>> for RoutingTransport<T> {
    type Response = Response<Bytes>;
    type Error = T::Error;
    type Future = BoxFuture<'static, Result<Response<Bytes>, T::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { Transport::execute(&this, request).await })
    }
}
