//! `oci-transport` is the request transport shared by Oracle Cloud Infrastructure service SDKs:
//! request signing, endpoint resolution, retries, circuit breaking and pagination.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use oci_transport::blockstorage::{BlockstorageClient, GetVolumeRequest};
//! use oci_transport::prelude::{CallContext, RetryPolicy, StaticConfigurationProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = StaticConfigurationProvider::from_pem(
//!         "us-ashburn-1",
//!         "ocid1.tenancy.oc1..example",
//!         "ocid1.user.oc1..example",
//!         &std::fs::read_to_string("oci_api_key.pem")?,
//!     )?;
//!     let client = BlockstorageClient::builder(Arc::new(provider))
//!         .retry_policy(RetryPolicy::sdk_default())
//!         .request_timeout(Duration::from_secs(30))
//!         .try_build()
//!         .map(BlockstorageClient::from_client)?;
//!
//!     let ctx = CallContext::new().with_timeout(Duration::from_secs(120));
//!     let response = client
//!         .get_volume(
//!             &ctx,
//!             GetVolumeRequest {
//!                 volume_id: "ocid1.volume.oc1..example".to_owned(),
//!                 ..GetVolumeRequest::default()
//!             },
//!         )
//!         .await?;
//!
//!     println!("{} is {}", response.volume.display_name, response.volume.lifecycle_state);
//!     Ok(())
//! }
//! ```
//!
//! # Recommended Defaults
//!
//! - Use `RetryPolicy::sdk_default()` for control-plane traffic.
//! - Give long-running work a deadline through [`CallContext::with_timeout`].
//! - Leave `opc_retry_token` unset on create calls unless you need to correlate
//!   retries across processes; one is generated per call.

#[cfg(all(not(feature = "tls-rustls-ring"), not(feature = "tls-rustls-aws-lc-rs")))]
compile_error!(
    "oci-transport requires one TLS backend feature: enable `tls-rustls-ring` or `tls-rustls-aws-lc-rs`"
);

/// Default `user-agent` sent by every client.
pub const CLIENT_VERSION: &str = concat!("oci-transport/", env!("CARGO_PKG_VERSION"));

pub mod binding;
pub mod blockstorage;
mod body;
mod circuit_breaker;
mod client;
mod config;
mod context;
pub mod enums;
mod env;
mod error;
mod execute;
mod idempotency;
mod metrics;
mod pagination;
mod region;
mod response;
mod retry;
mod signer;
mod transport;
mod util;

pub use crate::binding::{
    CollectionFormat, FromHeader, OciRequest, OciResponse, ParamValue, RequestDescriptor,
    ResponseBinder,
};
pub use crate::body::{BinaryBody, SeekableBody};
pub use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerPolicy, CircuitBreakerRegistry, CircuitStatus,
};
pub use crate::client::{ServiceClient, ServiceClientBuilder};
pub use crate::config::{
    ConfigurationProvider, Credential, MIN_RSA_KEY_BITS, StaticConfigurationProvider,
    key_fingerprint_of, parse_private_key_pem, validate_provider,
};
pub use crate::context::CallContext;
pub use crate::enums::OciEnum;
pub use crate::env::{
    CIRCUIT_BREAKER_ENABLED_ENV, CIRCUIT_BREAKER_SETTINGS_ENV, RETRY_ENABLED_ENV,
    RETRY_POLICY_ENV, SdkEnvironment, clear_global_retry_policy, global_retry_policy,
    set_global_retry_policy,
};
pub use crate::error::{
    Error, ErrorCode, INCORRECT_STATE_CODE, ServiceError, TimeoutPhase, TransportErrorKind,
};
pub use crate::execute::OperationSpec;
pub use crate::idempotency::{MAX_RETRY_TOKEN_LEN, generate_retry_token, is_valid_retry_token};
pub use crate::metrics::ClientMetricsSnapshot;
pub use crate::pagination::{PageableRequest, PageableResponse, Paginator};
pub use crate::region::{Endpoint, IAAS_ENDPOINT_TEMPLATE, Region, resolve};
pub use crate::response::RawResponse;
pub use crate::retry::{RetryClassifier, RetryDecision, RetryPolicy};
pub use crate::signer::{
    CONTENT_SHA256_HEADER, OBO_TOKEN_HEADER, REQUEST_TARGET, RequestSigner, SigningError,
    method_signs_body, signing_string,
};
pub use crate::transport::{
    DEFAULT_MAX_RESPONSE_BODY_BYTES, HttpTransport, HyperTransport, HyperTransportBuilder,
    TlsBackend, TransportFuture,
};

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        BinaryBody, CallContext, CircuitBreakerPolicy, CircuitBreakerRegistry, CircuitStatus,
        ClientMetricsSnapshot, ConfigurationProvider, Credential, Error, ErrorCode, OciEnum,
        OciRequest, OciResponse, OperationSpec, PageableRequest, PageableResponse, Paginator,
        Result, RetryPolicy, ServiceClient, ServiceClientBuilder, ServiceError,
        StaticConfigurationProvider,
    };
}

#[doc(hidden)]
pub mod __private {
    pub use serde;
}
