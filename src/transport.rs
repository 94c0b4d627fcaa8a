//! Round trippers: the request executors a recorder wraps

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::error::TransportError;

/// Executes a single HTTP request
///
/// The request is optional so that a missing request can be passed straight
/// through to the executor, which decides how to complain about it.
pub trait RoundTripper: Send + Sync {
    /// Send `request` and wait for the response
    fn round_trip(
        &self,
        request: Option<Request<Bytes>>,
    ) -> impl Future<Output = Result<Response<Bytes>, TransportError>> + Send;
}

impl<T: RoundTripper> RoundTripper for Arc<T> {
    fn round_trip(
        &self,
        request: Option<Request<Bytes>>,
    ) -> impl Future<Output = Result<Response<Bytes>, TransportError>> + Send {
        (**self).round_trip(request)
    }
}

/// Default round tripper backed by hyper's pooled client
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HyperTransport {
    /// Create a new transport with its own connection pool
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build_http();

        Self { client }
    }

    /// Process-wide shared transport
    #[must_use]
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<HyperTransport>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(Self::new())))
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundTripper for HyperTransport {
    fn round_trip(
        &self,
        request: Option<Request<Bytes>>,
    ) -> impl Future<Output = Result<Response<Bytes>, TransportError>> + Send {
        async move {
            let request = request.ok_or_else(|| TransportError::msg("no request to send"))?;

            debug!("Sending {} {}", request.method(), request.uri());

            let response = self
                .client
                .request(request.map(Full::new))
                .await
                .map_err(|e| {
                    warn!("Request failed: {e}");
                    TransportError::new(e)
                })?;

            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| {
                    warn!("Failed to read response body: {e}");
                    TransportError::new(e)
                })?
                .to_bytes();

            Ok(Response::from_parts(parts, body))
        }
    }
}
