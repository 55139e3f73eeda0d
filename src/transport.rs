//! The HTTP leg of one attempt: send a signed request, read the bounded body.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::Request;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;

use crate::Result;
use crate::body::{ReadBodyError, ReqBody, into_hyper_request, read_all_body_limited};
use crate::error::{Error, TimeoutPhase};
use crate::response::RawResponse;
use crate::util::{classify_transport_error, redact_uri_for_logs};

pub const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 8 * 1024 * 1024;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;

pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<RawResponse>> + Send + 'a>>;

/// Sends one fully signed request.
///
/// Implementations report failures as [`Error::Transport`], [`Error::Timeout`],
/// [`Error::ReadBody`] or [`Error::ResponseBodyTooLarge`] so the retry engine
/// and circuit breaker can classify them. Any HTTP status is a success here.
pub trait HttpTransport: Send + Sync {
    fn send<'a>(
        &'a self,
        operation: &'a str,
        request: Request<Bytes>,
        timeout: Duration,
    ) -> TransportFuture<'a>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsBackend {
    RustlsRing,
    RustlsAwsLcRs,
}

impl TlsBackend {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RustlsRing => "rustls-ring",
            Self::RustlsAwsLcRs => "rustls-aws-lc-rs",
        }
    }
}

const fn default_tls_backend() -> TlsBackend {
    if cfg!(feature = "tls-rustls-ring") {
        TlsBackend::RustlsRing
    } else {
        TlsBackend::RustlsAwsLcRs
    }
}

type HyperClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, ReqBody>;

/// Pooled hyper client over rustls, accepting both `https` and plain `http` endpoints.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
    max_response_body_bytes: usize,
    tls_backend: TlsBackend,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HyperTransport")
            .field("max_response_body_bytes", &self.max_response_body_bytes)
            .field("tls_backend", &self.tls_backend)
            .finish()
    }
}

impl HyperTransport {
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::default()
    }

    pub fn tls_backend(&self) -> TlsBackend {
        self.tls_backend
    }

    pub fn max_response_body_bytes(&self) -> usize {
        self.max_response_body_bytes
    }
}

#[derive(Clone, Debug)]
pub struct HyperTransportBuilder {
    connect_timeout: Duration,
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
    http2_only: bool,
    max_response_body_bytes: usize,
    tls_backend: TlsBackend,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            http2_only: false,
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
            tls_backend: default_tls_backend(),
        }
    }
}

impl HyperTransportBuilder {
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn pool_idle_timeout(mut self, pool_idle_timeout: Duration) -> Self {
        self.pool_idle_timeout = pool_idle_timeout;
        self
    }

    pub fn pool_max_idle_per_host(mut self, pool_max_idle_per_host: usize) -> Self {
        self.pool_max_idle_per_host = pool_max_idle_per_host;
        self
    }

    pub fn http2_only(mut self, http2_only: bool) -> Self {
        self.http2_only = http2_only;
        self
    }

    pub fn max_response_body_bytes(mut self, max_response_body_bytes: usize) -> Self {
        self.max_response_body_bytes = max_response_body_bytes.max(1);
        self
    }

    pub fn tls_backend(mut self, tls_backend: TlsBackend) -> Self {
        self.tls_backend = tls_backend;
        self
    }

    pub fn try_build(self) -> Result<HyperTransport> {
        let client = match self.tls_backend {
            TlsBackend::RustlsRing => build_rustls_ring_client(&self)?,
            TlsBackend::RustlsAwsLcRs => build_rustls_aws_lc_rs_client(&self)?,
        };
        Ok(HyperTransport {
            client,
            max_response_body_bytes: self.max_response_body_bytes,
            tls_backend: self.tls_backend,
        })
    }
}

fn http_connector(options: &HyperTransportBuilder) -> HttpConnector {
    let mut connector = HttpConnector::new();
    connector.enforce_http(false);
    connector.set_nodelay(true);
    connector.set_connect_timeout(Some(options.connect_timeout));
    connector
}

fn finish_client(
    options: &HyperTransportBuilder,
    https: hyper_rustls::HttpsConnector<HttpConnector>,
) -> HyperClient {
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(options.pool_idle_timeout)
        .pool_max_idle_per_host(options.pool_max_idle_per_host)
        .http2_only(options.http2_only)
        .build(https)
}

fn tls_setup_error(backend: TlsBackend, source: impl std::fmt::Display) -> Error {
    Error::ConfigurationInvalid {
        message: format!("cannot initialise {} tls: {source}", backend.as_str()),
    }
}

#[cfg(feature = "tls-rustls-ring")]
fn build_rustls_ring_client(options: &HyperTransportBuilder) -> Result<HyperClient> {
    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
        .map_err(|source| tls_setup_error(TlsBackend::RustlsRing, source))?
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http_connector(options));
    Ok(finish_client(options, https))
}

#[cfg(not(feature = "tls-rustls-ring"))]
fn build_rustls_ring_client(_options: &HyperTransportBuilder) -> Result<HyperClient> {
    Err(tls_setup_error(TlsBackend::RustlsRing, "backend feature is not enabled"))
}

#[cfg(feature = "tls-rustls-aws-lc-rs")]
fn build_rustls_aws_lc_rs_client(options: &HyperTransportBuilder) -> Result<HyperClient> {
    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::aws_lc_rs::default_provider())
        .map_err(|source| tls_setup_error(TlsBackend::RustlsAwsLcRs, source))?
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http_connector(options));
    Ok(finish_client(options, https))
}

#[cfg(not(feature = "tls-rustls-aws-lc-rs"))]
fn build_rustls_aws_lc_rs_client(_options: &HyperTransportBuilder) -> Result<HyperClient> {
    Err(tls_setup_error(TlsBackend::RustlsAwsLcRs, "backend feature is not enabled"))
}

impl HttpTransport for HyperTransport {
    fn send<'a>(
        &'a self,
        operation: &'a str,
        request: Request<Bytes>,
        attempt_timeout: Duration,
    ) -> TransportFuture<'a> {
        Box::pin(async move {
            let method = request.method().clone();
            let uri = redact_uri_for_logs(&request.uri().to_string());
            let started_at = Instant::now();

            let response = match timeout(
                attempt_timeout,
                self.client.request(into_hyper_request(request)),
            )
            .await
            {
                Ok(Ok(response)) => response,
                Ok(Err(source)) => {
                    return Err(Error::Transport {
                        kind: classify_transport_error(&source),
                        operation: operation.to_owned(),
                        method,
                        uri,
                        source: Box::new(source),
                    });
                }
                Err(_) => {
                    return Err(Error::Timeout {
                        phase: TimeoutPhase::Transport,
                        timeout_ms: attempt_timeout.as_millis(),
                        operation: operation.to_owned(),
                        method,
                        uri,
                    });
                }
            };

            let (parts, body) = response.into_parts();
            let read_timeout = attempt_timeout.saturating_sub(started_at.elapsed());
            let body = match timeout(
                read_timeout,
                read_all_body_limited(body, self.max_response_body_bytes),
            )
            .await
            {
                Ok(Ok(body)) => body,
                Ok(Err(ReadBodyError::Read(source))) => {
                    return Err(Error::ReadBody {
                        operation: operation.to_owned(),
                        source: Box::new(source),
                    });
                }
                Ok(Err(ReadBodyError::TooLarge { actual_bytes })) => {
                    return Err(Error::ResponseBodyTooLarge {
                        operation: operation.to_owned(),
                        limit_bytes: self.max_response_body_bytes,
                        actual_bytes,
                    });
                }
                Err(_) => {
                    return Err(Error::Timeout {
                        phase: TimeoutPhase::ResponseBody,
                        timeout_ms: attempt_timeout.as_millis(),
                        operation: operation.to_owned(),
                        method,
                        uri,
                    });
                }
            };
            Ok(RawResponse::new(parts.status, parts.headers, body))
        })
    }
}
