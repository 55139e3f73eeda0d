use std::time::Duration;

use http::{Method, StatusCode};
use thiserror::Error;

use crate::signer::SigningError;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Service error code that marks a resource as being in a transient state.
pub const INCORRECT_STATE_CODE: &str = "IncorrectState";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeoutPhase {
    Transport,
    ResponseBody,
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Transport => "transport",
            Self::ResponseBody => "response_body",
        };
        formatter.write_str(text)
    }
}

/// A non-2xx answer from an OCI service, enriched with the call it belongs to.
#[derive(Clone, Debug)]
pub struct ServiceError {
    pub(crate) status: StatusCode,
    pub(crate) code: String,
    pub(crate) message: String,
    pub(crate) opc_request_id: Option<String>,
    pub(crate) service: String,
    pub(crate) operation: String,
    pub(crate) api_reference_link: Option<String>,
    pub(crate) request_endpoint: String,
    pub(crate) timestamp: String,
    pub(crate) retry_after: Option<Duration>,
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn opc_request_id(&self) -> Option<&str> {
        self.opc_request_id.as_deref()
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn api_reference_link(&self) -> Option<&str> {
        self.api_reference_link.as_deref()
    }

    pub fn request_endpoint(&self) -> &str {
        &self.request_endpoint
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Server supplied `retry-after` hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub fn is_incorrect_state(&self) -> bool {
        self.status == StatusCode::CONFLICT && self.code == INCORRECT_STATE_CODE
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "Error returned by {} Service. Http Status Code: {}. Error Code: {}. Opc request id: {}. Message: {}",
            self.service,
            self.status.as_u16(),
            self.code,
            self.opc_request_id.as_deref().unwrap_or("<none>"),
            self.message,
        )?;
        write!(formatter, "\nOperation Name: {}", self.operation)?;
        write!(formatter, "\nTimestamp: {}", self.timestamp)?;
        write!(formatter, "\nClient Version: {}", crate::CLIENT_VERSION)?;
        write!(formatter, "\nRequest Endpoint: {}", self.request_endpoint)?;
        write!(
            formatter,
            "\nTroubleshooting Tips: See https://docs.oracle.com/iaas/Content/API/References/apierrors.htm#apierrors_{status}__{status}_{code} for more information about resolving this error.",
            status = self.status.as_u16(),
            code = self.code.to_ascii_lowercase(),
        )?;
        if let Some(link) = &self.api_reference_link {
            write!(
                formatter,
                "\nAlso see {link} for details on this operation's requirements."
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for ServiceError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    ConfigurationInvalid,
    EndpointUnknown,
    InvalidEndpoint,
    InvalidEnumValue,
    RequestBinding,
    SigningFailed,
    BodyNotRewindable,
    Transport,
    Timeout,
    ReadBody,
    ResponseBodyTooLarge,
    Service,
    Deserialize,
    ResponseBinding,
    CircuitOpen,
    Cancelled,
    DeadlineExceeded,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigurationInvalid => "configuration_invalid",
            Self::EndpointUnknown => "endpoint_unknown",
            Self::InvalidEndpoint => "invalid_endpoint",
            Self::InvalidEnumValue => "invalid_enum_value",
            Self::RequestBinding => "request_binding",
            Self::SigningFailed => "signing_failed",
            Self::BodyNotRewindable => "body_not_rewindable",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::ReadBody => "read_body",
            Self::ResponseBodyTooLarge => "response_body_too_large",
            Self::Service => "service",
            Self::Deserialize => "deserialize",
            Self::ResponseBinding => "response_binding",
            Self::CircuitOpen => "circuit_open",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid client configuration: {message}")]
    ConfigurationInvalid { message: String },
    #[error("cannot resolve endpoint for service {service} in region {region}")]
    EndpointUnknown { service: String, region: String },
    #[error("invalid endpoint {endpoint}: {message}")]
    InvalidEndpoint { endpoint: String, message: String },
    #[error("invalid enum value in {operation} request: {message}")]
    InvalidEnumValue { operation: String, message: String },
    #[error("failed to bind {operation} request: {message}")]
    RequestBinding { operation: String, message: String },
    #[error("failed to sign {operation} request: {source}")]
    SigningFailed {
        operation: String,
        #[source]
        source: SigningError,
    },
    #[error("binary body of {operation} request cannot be replayed: {source}")]
    BodyNotRewindable {
        operation: String,
        #[source]
        source: std::io::Error,
    },
    #[error("http transport error ({kind}) in {operation} for {method} {uri}: {source}")]
    Transport {
        kind: TransportErrorKind,
        operation: String,
        method: Method,
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("{operation} timed out in {phase} after {timeout_ms}ms for {method} {uri}")]
    Timeout {
        phase: TimeoutPhase,
        timeout_ms: u128,
        operation: String,
        method: Method,
        uri: String,
    },
    #[error("failed to read {operation} response body: {source}")]
    ReadBody {
        operation: String,
        #[source]
        source: BoxError,
    },
    #[error(
        "{operation} response body too large ({actual_bytes} bytes > {limit_bytes} bytes)"
    )]
    ResponseBodyTooLarge {
        operation: String,
        limit_bytes: usize,
        actual_bytes: usize,
    },
    #[error(transparent)]
    Service(Box<ServiceError>),
    #[error("failed to decode {operation} response json: {source}; body={body}")]
    Deserialize {
        operation: String,
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("failed to bind {operation} response: {message}")]
    ResponseBinding { operation: String, message: String },
    #[error(
        "circuit breaker for service {service} is open, {operation} refused{}",
        retry_hint(.retry_after_ms)
    )]
    CircuitOpen {
        service: String,
        operation: String,
        retry_after_ms: Option<u128>,
    },
    #[error("{operation} was cancelled")]
    Cancelled { operation: String },
    #[error("{operation} deadline exceeded after {elapsed_ms}ms")]
    DeadlineExceeded {
        operation: String,
        elapsed_ms: u128,
        #[source]
        last_error: Option<Box<Error>>,
    },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ConfigurationInvalid { .. } => ErrorCode::ConfigurationInvalid,
            Self::EndpointUnknown { .. } => ErrorCode::EndpointUnknown,
            Self::InvalidEndpoint { .. } => ErrorCode::InvalidEndpoint,
            Self::InvalidEnumValue { .. } => ErrorCode::InvalidEnumValue,
            Self::RequestBinding { .. } => ErrorCode::RequestBinding,
            Self::SigningFailed { .. } => ErrorCode::SigningFailed,
            Self::BodyNotRewindable { .. } => ErrorCode::BodyNotRewindable,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::ReadBody { .. } => ErrorCode::ReadBody,
            Self::ResponseBodyTooLarge { .. } => ErrorCode::ResponseBodyTooLarge,
            Self::Service(_) => ErrorCode::Service,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::ResponseBinding { .. } => ErrorCode::ResponseBinding,
            Self::CircuitOpen { .. } => ErrorCode::CircuitOpen,
            Self::Cancelled { .. } => ErrorCode::Cancelled,
            Self::DeadlineExceeded { .. } => ErrorCode::DeadlineExceeded,
        }
    }

    /// Name of the operation the error was raised for, when it came from a call path.
    pub fn operation(&self) -> Option<&str> {
        match self {
            Self::ConfigurationInvalid { .. }
            | Self::EndpointUnknown { .. }
            | Self::InvalidEndpoint { .. } => None,
            Self::InvalidEnumValue { operation, .. }
            | Self::RequestBinding { operation, .. }
            | Self::SigningFailed { operation, .. }
            | Self::BodyNotRewindable { operation, .. }
            | Self::Transport { operation, .. }
            | Self::Timeout { operation, .. }
            | Self::ReadBody { operation, .. }
            | Self::ResponseBodyTooLarge { operation, .. }
            | Self::Deserialize { operation, .. }
            | Self::ResponseBinding { operation, .. }
            | Self::CircuitOpen { operation, .. }
            | Self::Cancelled { operation }
            | Self::DeadlineExceeded { operation, .. } => Some(operation),
            Self::Service(error) => Some(&error.operation),
        }
    }

    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Self::Service(error) => Some(error),
            Self::DeadlineExceeded {
                last_error: Some(last_error),
                ..
            } => last_error.service_error(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.service_error().map(ServiceError::status)
    }

    /// Server-assigned correlation id (`opc-request-id`), when a response was received.
    pub fn opc_request_id(&self) -> Option<&str> {
        self.service_error().and_then(ServiceError::opc_request_id)
    }

    /// Whether an identical attempt could plausibly succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { kind, .. } => *kind != TransportErrorKind::Tls,
            Self::Timeout { .. } | Self::ReadBody { .. } => true,
            Self::Service(error) => {
                let status = error.status.as_u16();
                status == 408 || status == 429 || status >= 500 || error.is_incorrect_state()
            }
            Self::DeadlineExceeded { .. } => true,
            _ => false,
        }
    }

    /// Errors that end a call immediately, whatever the retry policy says.
    pub(crate) fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationInvalid { .. }
                | Self::EndpointUnknown { .. }
                | Self::InvalidEndpoint { .. }
                | Self::InvalidEnumValue { .. }
                | Self::RequestBinding { .. }
                | Self::SigningFailed { .. }
                | Self::BodyNotRewindable { .. }
                | Self::ResponseBodyTooLarge { .. }
                | Self::CircuitOpen { .. }
                | Self::Cancelled { .. }
                | Self::DeadlineExceeded { .. }
        )
    }
}

fn retry_hint(retry_after_ms: &Option<u128>) -> String {
    retry_after_ms
        .map(|wait| format!("; retry after {wait}ms"))
        .unwrap_or_default()
}
