//! Operation dispatch: the retry engine and the per-attempt bind/sign/send/bind cycle.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use http::{Method, StatusCode};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{Instrument, debug, info_span, warn};

use crate::Result;
use crate::binding::{
    OPC_REQUEST_ID_HEADER, OPC_RETRY_TOKEN_HEADER, OciRequest, OciResponse, RequestDescriptor,
    ResponseBinder,
};
use crate::circuit_breaker::CircuitBreaker;
use crate::client::{ClientInner, ServiceClient};
use crate::context::CallContext;
use crate::enums::enum_validation_error;
use crate::error::{Error, ServiceError};
use crate::idempotency::{generate_retry_token, is_valid_retry_token};
use crate::metrics::ClientMetrics;
use crate::region::Endpoint;
use crate::response::RawResponse;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::util::{
    bounded_retry_delay, parse_retry_after, phase_timeout, redact_uri_for_logs,
    rfc3339_millis_now, truncate_body,
};

/// Static description of one service operation, as emitted next to its request type.
#[derive(Clone, Debug)]
pub struct OperationSpec {
    pub name: &'static str,
    pub method: Method,
    /// Relative to the client's base path, with `{param}` placeholders.
    pub path: &'static str,
    pub api_reference_link: Option<&'static str>,
    /// Whether the operation carries an `opc-retry-token` that must be filled in.
    pub retry_token: bool,
}

/// One attempt of a logical call. Each `run` is a complete bind, sign, send and bind cycle.
pub(crate) trait Attempt {
    type Output;

    fn run(
        &mut self,
        attempt: usize,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Output>> + Send;
}

/// What the engine needs to know about the call besides the attempt itself.
pub(crate) struct RetryScope<'a> {
    pub(crate) service: &'a str,
    pub(crate) operation: &'a str,
    pub(crate) method: &'a Method,
    pub(crate) uri: &'a str,
    pub(crate) request_timeout: Duration,
    pub(crate) breaker: Option<&'a Arc<CircuitBreaker>>,
    pub(crate) metrics: &'a ClientMetrics,
}

fn deadline_exceeded(scope: &RetryScope<'_>, started_at: Instant, last_error: Option<Error>) -> Error {
    Error::DeadlineExceeded {
        operation: scope.operation.to_owned(),
        elapsed_ms: started_at.elapsed().as_millis(),
        last_error: last_error.map(Box::new),
    }
}

fn cancelled(scope: &RetryScope<'_>) -> Error {
    Error::Cancelled {
        operation: scope.operation.to_owned(),
    }
}

/// Runs attempts until one succeeds, the policy gives up, the circuit opens,
/// the deadline passes or the call is cancelled.
///
/// Attempts are strictly sequential. A `CircuitOpen` rejection ends the call
/// without consuming an attempt or touching the network.
pub(crate) async fn run_with_retry<A: Attempt>(
    ctx: &CallContext,
    policy: &RetryPolicy,
    max_attempts: usize,
    scope: &RetryScope<'_>,
    attempt_fn: &mut A,
) -> Result<A::Output> {
    let started_at = Instant::now();
    let max_attempts = max_attempts.max(1);
    let mut last_error: Option<Error> = None;
    let mut attempt = 1_usize;

    loop {
        if ctx.is_cancelled() {
            return Err(cancelled(scope));
        }
        let Some(attempt_timeout) = phase_timeout(scope.request_timeout, ctx.deadline()) else {
            return Err(deadline_exceeded(scope, started_at, last_error));
        };
        let circuit_attempt = match scope.breaker {
            Some(breaker) => match breaker.begin() {
                Ok(circuit_attempt) => Some(circuit_attempt),
                Err(retry_after) => {
                    return Err(Error::CircuitOpen {
                        service: scope.service.to_owned(),
                        operation: scope.operation.to_owned(),
                        retry_after_ms: retry_after.map(|wait| wait.as_millis()),
                    });
                }
            },
            None => None,
        };

        let span = info_span!(
            "oci.request",
            service = %scope.service,
            operation = %scope.operation,
            method = %scope.method,
            uri = %scope.uri,
            attempt = attempt,
            max_attempts = max_attempts
        );
        scope.metrics.record_attempt();
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancellation_token().cancelled() => {
                drop(circuit_attempt);
                return Err(cancelled(scope));
            }
            outcome = attempt_fn.run(attempt, attempt_timeout).instrument(span) => outcome,
        };

        let error = match outcome {
            Ok(output) => {
                if let Some(circuit_attempt) = circuit_attempt {
                    circuit_attempt.mark_success();
                }
                return Ok(output);
            }
            Err(error) => error,
        };
        if let Some(circuit_attempt) = circuit_attempt {
            circuit_attempt.finish(Some(&error));
        }

        if error.is_terminal() {
            return Err(error);
        }
        if ctx.deadline_passed() {
            return Err(deadline_exceeded(scope, started_at, Some(error)));
        }
        let decision = RetryDecision::for_error(&error, attempt, max_attempts, scope.operation);
        if attempt >= max_attempts || !policy.should_retry_decision(&decision) {
            return Err(error);
        }

        let retry_delay = error
            .service_error()
            .and_then(ServiceError::retry_after)
            .unwrap_or_else(|| policy.backoff_for_retry(attempt));
        let Some(retry_delay) = bounded_retry_delay(retry_delay, ctx.deadline()) else {
            return Err(deadline_exceeded(scope, started_at, Some(error)));
        };
        warn!(
            service = %scope.service,
            operation = %scope.operation,
            attempt,
            max_attempts,
            delay_ms = retry_delay.as_millis() as u64,
            error = %error,
            "retrying request after failure"
        );
        scope.metrics.record_retry();
        last_error = Some(error);
        if !retry_delay.is_zero() {
            tokio::select! {
                biased;
                _ = ctx.cancellation_token().cancelled() => return Err(cancelled(scope)),
                _ = sleep(retry_delay) => {}
            }
        }
        attempt += 1;
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Turns a non-2xx response into a [`ServiceError`] tied to the operation it answers.
pub(crate) fn service_error_from_response(
    service: &str,
    spec: &OperationSpec,
    request_endpoint: String,
    response: &RawResponse,
) -> Error {
    let status = response.status();
    let envelope = serde_json::from_slice::<ErrorEnvelope>(response.body()).unwrap_or_default();
    let code = envelope
        .code
        .filter(|code| !code.is_empty())
        .unwrap_or_else(|| code_for_status(status));
    let message = envelope
        .message
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            if response.body().is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_owned()
            } else {
                truncate_body(response.body())
            }
        });

    Error::Service(Box::new(ServiceError {
        status,
        code,
        message,
        opc_request_id: response.header(OPC_REQUEST_ID_HEADER).map(str::to_owned),
        service: service.to_owned(),
        operation: spec.name.to_owned(),
        api_reference_link: spec.api_reference_link.map(str::to_owned),
        request_endpoint,
        timestamp: rfc3339_millis_now(),
        retry_after: parse_retry_after(response.headers(), SystemTime::now()),
    }))
}

/// `ServiceUnavailable` for 503 and so on, used when the body carries no code.
fn code_for_status(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => reason
            .split(|ch: char| !ch.is_ascii_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect(),
        None => format!("HttpStatus{}", status.as_u16()),
    }
}

struct OperationAttempt<'a, Req, Resp> {
    client: &'a ClientInner,
    spec: &'a OperationSpec,
    endpoint: &'a Endpoint,
    request: &'a mut Req,
    response: PhantomData<fn() -> Resp>,
}

impl<Req, Resp> Attempt for OperationAttempt<'_, Req, Resp>
where
    Req: OciRequest,
    Resp: OciResponse + Send,
{
    type Output = (Resp, StatusCode);

    async fn run(&mut self, _attempt: usize, timeout: Duration) -> Result<(Resp, StatusCode)> {
        let operation = self.spec.name;
        let mut descriptor =
            RequestDescriptor::new(operation, self.spec.method.clone(), self.spec.path);
        self.request.bind(&mut descriptor)?;
        if self.spec.retry_token
            && let Some(token) = self.request.retry_token()
        {
            descriptor.header(OPC_RETRY_TOKEN_HEADER, token)?;
        }
        if let Some(body) = self.request.binary_body() {
            let content_type = body.configured_content_type().map(str::to_owned);
            let bytes = body
                .read_for_attempt()
                .await
                .map_err(|source| Error::BodyNotRewindable {
                    operation: operation.to_owned(),
                    source,
                })?;
            descriptor.binary_body(bytes, content_type.as_deref())?;
        }
        descriptor.merge_default_headers(&self.client.default_headers);

        let mut http_request = descriptor.to_http_request(self.endpoint)?;
        self.client
            .signer
            .sign(&mut http_request)
            .map_err(|source| Error::SigningFailed {
                operation: operation.to_owned(),
                source,
            })?;
        let request_endpoint = format!(
            "{} {}",
            http_request.method(),
            redact_uri_for_logs(&http_request.uri().to_string())
        );

        debug!("sending request");
        let started = Instant::now();
        let response = self
            .client
            .transport
            .send(operation, http_request, timeout)
            .await?;
        let status = response.status();
        debug!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );

        if !status.is_success() {
            return Err(service_error_from_response(
                &self.client.service,
                self.spec,
                request_endpoint,
                &response,
            ));
        }
        let typed = Resp::from_response(ResponseBinder::new(operation, response))?;
        Ok((typed, status))
    }
}

impl ServiceClient {
    /// Dispatches one logical call: validate, assign the retry token, then
    /// run attempts through the retry engine and bind the typed response.
    pub async fn execute<Req, Resp>(
        &self,
        ctx: &CallContext,
        spec: &OperationSpec,
        request: Req,
    ) -> Result<Resp>
    where
        Req: OciRequest,
        Resp: OciResponse + Send,
    {
        let inner = self.inner();
        let started_at = Instant::now();
        let _in_flight = inner.metrics.record_call_started();
        match self.dispatch(ctx, spec, request).await {
            Ok((response, status)) => {
                inner
                    .metrics
                    .record_call_succeeded(status.as_u16(), started_at.elapsed());
                Ok(response)
            }
            Err(error) => {
                inner.metrics.record_call_failed(&error, started_at.elapsed());
                Err(error)
            }
        }
    }

    async fn dispatch<Req, Resp>(
        &self,
        ctx: &CallContext,
        spec: &OperationSpec,
        mut request: Req,
    ) -> Result<(Resp, StatusCode)>
    where
        Req: OciRequest,
        Resp: OciResponse + Send,
    {
        let inner = self.inner();
        if let Some(error) = enum_validation_error(spec.name, request.invalid_enum_values()) {
            return Err(error);
        }
        if spec.retry_token {
            match request.retry_token() {
                Some(token) if !is_valid_retry_token(token) => {
                    return Err(Error::RequestBinding {
                        operation: spec.name.to_owned(),
                        message: format!("invalid {OPC_RETRY_TOKEN_HEADER}: {token:?}"),
                    });
                }
                Some(_) => {}
                None => request.set_retry_token(generate_retry_token()),
            }
        }

        let policy = self.effective_retry_policy(request.retry_policy());
        let rewindable = request
            .binary_body()
            .is_none_or(|body| body.is_rewindable());
        let max_attempts = if rewindable {
            policy.configured_max_attempts()
        } else {
            1
        };

        let endpoint = self.endpoint();
        let uri = redact_uri_for_logs(&format!("{endpoint}{}", spec.path));
        let scope = RetryScope {
            service: &inner.service,
            operation: spec.name,
            method: &spec.method,
            uri: &uri,
            request_timeout: inner.request_timeout,
            breaker: inner.circuit_breaker.as_ref(),
            metrics: &inner.metrics,
        };
        let mut attempt = OperationAttempt {
            client: inner,
            spec,
            endpoint: &endpoint,
            request: &mut request,
            response: PhantomData,
        };
        run_with_retry(ctx, &policy, max_attempts, &scope, &mut attempt).await
    }
}
