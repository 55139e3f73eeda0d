use std::sync::{Arc, RwLock};
use std::time::Duration;

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue, USER_AGENT};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerPolicy, CircuitBreakerRegistry, CircuitStatus};
use crate::config::{ConfigurationProvider, validate_provider};
use crate::env::{SdkEnvironment, global_retry_policy};
use crate::error::Error;
use crate::metrics::{ClientMetrics, ClientMetricsSnapshot};
use crate::region::{Endpoint, Region, resolve};
use crate::retry::RetryPolicy;
use crate::signer::RequestSigner;
use crate::transport::{DEFAULT_MAX_RESPONSE_BODY_BYTES, HttpTransport, HyperTransport};
use crate::util::{read_unpoisoned, write_unpoisoned};
use crate::{CLIENT_VERSION, Result};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ServiceClientBuilder {
    service: String,
    provider: Arc<dyn ConfigurationProvider>,
    region: Option<String>,
    endpoint: Option<String>,
    endpoint_template: Option<String>,
    base_path: String,
    retry_policy: Option<RetryPolicy>,
    circuit_breaker_policy: Option<CircuitBreakerPolicy>,
    circuit_breaker_registry: Option<CircuitBreakerRegistry>,
    circuit_breaker_disabled: bool,
    transport: Option<Arc<dyn HttpTransport>>,
    request_timeout: Duration,
    max_response_body_bytes: usize,
    default_headers: Vec<(String, String)>,
    signed_headers: Option<(Vec<String>, Vec<String>)>,
    client_name: String,
    environment: Option<SdkEnvironment>,
}

impl ServiceClientBuilder {
    pub(crate) fn new(service: impl Into<String>, provider: Arc<dyn ConfigurationProvider>) -> Self {
        Self {
            service: service.into(),
            provider,
            region: None,
            endpoint: None,
            endpoint_template: None,
            base_path: String::new(),
            retry_policy: None,
            circuit_breaker_policy: None,
            circuit_breaker_registry: None,
            circuit_breaker_disabled: false,
            transport: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
            default_headers: Vec::new(),
            signed_headers: None,
            client_name: CLIENT_VERSION.to_owned(),
            environment: None,
        }
    }

    /// Overrides the provider's region.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Uses this url verbatim instead of resolving one from the region.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Template with `{region}` and `{secondLevelDomain}` placeholders.
    pub fn endpoint_template(mut self, template: impl Into<String>) -> Self {
        self.endpoint_template = Some(template.into());
        self
    }

    /// API version prefix placed before every operation path.
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    pub fn circuit_breaker_policy(mut self, policy: CircuitBreakerPolicy) -> Self {
        self.circuit_breaker_policy = Some(policy);
        self
    }

    /// Shares breakers with every other client built on the same registry.
    ///
    /// Without one the client gets a private breaker, so two clients for the
    /// same service only share breaker state through a common registry such as
    /// [`CircuitBreakerRegistry::process`].
    pub fn circuit_breaker_registry(mut self, registry: CircuitBreakerRegistry) -> Self {
        self.circuit_breaker_registry = Some(registry);
        self
    }

    pub fn disable_circuit_breaker(mut self) -> Self {
        self.circuit_breaker_disabled = true;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Per-attempt timeout, further capped by the call deadline.
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout.max(Duration::from_millis(1));
        self
    }

    /// Applies to the default transport only.
    pub fn max_response_body_bytes(mut self, max_response_body_bytes: usize) -> Self {
        self.max_response_body_bytes = max_response_body_bytes.max(1);
        self
    }

    /// Sent on every request unless the operation binds the same header.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Replaces the signed header lists for requests without and with a body.
    pub fn signed_headers<G, B>(mut self, generic: G, body: B) -> Self
    where
        G: IntoIterator,
        G::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        self.signed_headers = Some((
            generic.into_iter().map(Into::into).collect(),
            body.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// `user-agent` value.
    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    /// Replaces the process environment as the source of default overrides.
    pub fn environment(mut self, environment: SdkEnvironment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn try_build(self) -> Result<ServiceClient> {
        validate_provider(self.provider.as_ref())?;

        let endpoint = match &self.endpoint {
            Some(endpoint) => custom_endpoint(endpoint, &self.base_path)?,
            None => {
                let region = match &self.region {
                    Some(region) => region.clone(),
                    None => self.provider.region()?,
                };
                resolve_endpoint(
                    &self.service,
                    self.endpoint_template.as_deref(),
                    &region,
                    &self.base_path,
                )?
            }
        };

        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, config_header_value("user-agent", &self.client_name)?);
        for (name, value) in &self.default_headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::ConfigurationInvalid {
                    message: format!("invalid default header name {name:?}"),
                })?;
            default_headers.insert(header_name, config_header_value(name, value)?);
        }

        let environment = self.environment.unwrap_or_else(SdkEnvironment::from_env);
        let circuit_breaker = if self.circuit_breaker_disabled
            || environment.circuit_breaker_enabled() == Some(false)
        {
            None
        } else {
            let policy = match self.circuit_breaker_policy {
                Some(policy) => policy,
                None => environment.apply_circuit_breaker(CircuitBreakerPolicy::default()),
            };
            let registry = self.circuit_breaker_registry.unwrap_or_default();
            Some(registry.breaker(&self.service, policy))
        };

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                HyperTransport::builder()
                    .max_response_body_bytes(self.max_response_body_bytes)
                    .try_build()?,
            ),
        };
        let signer = match self.signed_headers {
            Some((generic, body)) => RequestSigner::with_headers(Arc::clone(&self.provider), generic, body),
            None => RequestSigner::new(Arc::clone(&self.provider)),
        };

        Ok(ServiceClient {
            inner: Arc::new(ClientInner {
                service: self.service,
                endpoint_template: self.endpoint_template,
                base_path: self.base_path,
                endpoint: RwLock::new(endpoint),
                signer,
                transport,
                retry_policy: self.retry_policy,
                environment,
                circuit_breaker,
                request_timeout: self.request_timeout,
                default_headers,
                metrics: ClientMetrics::default(),
            }),
        })
    }

    /// # Panics
    ///
    /// Panics when [`Self::try_build`] would fail.
    pub fn build(self) -> ServiceClient {
        self.try_build()
            .unwrap_or_else(|error| panic!("failed to build oci service client: {error}"))
    }
}

fn config_header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| Error::ConfigurationInvalid {
        message: format!("invalid value for header {name}"),
    })
}

fn custom_endpoint(endpoint: &str, base_path: &str) -> Result<Endpoint> {
    let endpoint = Endpoint::parse(endpoint)?;
    if endpoint.base_path().is_empty() {
        return Ok(endpoint.with_base_path(base_path));
    }
    Ok(endpoint)
}

fn resolve_endpoint(
    service: &str,
    template: Option<&str>,
    region: &str,
    base_path: &str,
) -> Result<Endpoint> {
    let endpoint = match template {
        Some(template) => Region::parse(region)
            .map_err(|_| Error::EndpointUnknown {
                service: service.to_owned(),
                region: region.to_owned(),
            })?
            .endpoint_for_template(template)?,
        None => resolve(&service.to_ascii_lowercase(), region)?,
    };
    Ok(endpoint.with_base_path(base_path))
}

pub(crate) struct ClientInner {
    pub(crate) service: String,
    endpoint_template: Option<String>,
    base_path: String,
    endpoint: RwLock<Endpoint>,
    pub(crate) signer: RequestSigner,
    pub(crate) transport: Arc<dyn HttpTransport>,
    retry_policy: Option<RetryPolicy>,
    environment: SdkEnvironment,
    pub(crate) circuit_breaker: Option<Arc<CircuitBreaker>>,
    pub(crate) request_timeout: Duration,
    pub(crate) default_headers: HeaderMap,
    pub(crate) metrics: ClientMetrics,
}

/// Signed, retrying client for one OCI service. Cheap to clone and safe to share.
#[derive(Clone)]
pub struct ServiceClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ServiceClient")
            .field("service", &self.inner.service)
            .field("endpoint", &self.endpoint())
            .field("retry_policy", &self.inner.retry_policy)
            .field("circuit_breaker", &self.circuit_status())
            .finish_non_exhaustive()
    }
}

impl ServiceClient {
    pub fn builder(
        service: impl Into<String>,
        provider: Arc<dyn ConfigurationProvider>,
    ) -> ServiceClientBuilder {
        ServiceClientBuilder::new(service, provider)
    }

    pub(crate) fn inner(&self) -> &ClientInner {
        &self.inner
    }

    pub fn service(&self) -> &str {
        &self.inner.service
    }

    /// Current endpoint, base path included.
    pub fn endpoint(&self) -> Endpoint {
        read_unpoisoned(&self.inner.endpoint).clone()
    }

    /// Re-resolves the endpoint for `region`. Calls already in flight keep the old one.
    pub fn set_region(&self, region: &str) -> Result<()> {
        let endpoint = resolve_endpoint(
            &self.inner.service,
            self.inner.endpoint_template.as_deref(),
            region,
            &self.inner.base_path,
        )?;
        *write_unpoisoned(&self.inner.endpoint) = endpoint;
        Ok(())
    }

    /// Points the client at `endpoint` verbatim. Calls already in flight keep the old one.
    pub fn set_endpoint(&self, endpoint: &str) -> Result<()> {
        let endpoint = custom_endpoint(endpoint, &self.inner.base_path)?;
        *write_unpoisoned(&self.inner.endpoint) = endpoint;
        Ok(())
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.inner.circuit_breaker.as_ref()
    }

    pub fn circuit_status(&self) -> Option<CircuitStatus> {
        self.inner.circuit_breaker.as_ref().map(|breaker| breaker.status())
    }

    pub fn metrics_snapshot(&self) -> ClientMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Request override, then client policy, then the global override, then the
    /// environment default; a single attempt when none is set.
    pub(crate) fn effective_retry_policy(&self, request_policy: Option<&RetryPolicy>) -> RetryPolicy {
        if let Some(policy) = request_policy {
            return policy.clone();
        }
        if let Some(policy) = &self.inner.retry_policy {
            return policy.clone();
        }
        if let Some(policy) = global_retry_policy() {
            return policy;
        }
        self.inner
            .environment
            .default_retry_policy()
            .cloned()
            .unwrap_or_else(RetryPolicy::no_retry)
    }
}
