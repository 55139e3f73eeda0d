//! HTTP request signing (draft-cavage signature, `rsa-sha256`).

use std::sync::Arc;
use std::time::SystemTime;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, DATE, HOST, HeaderName, HeaderValue};
use http::{Method, Request};
use rsa::Pkcs1v15Sign;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::ConfigurationProvider;

pub const REQUEST_TARGET: &str = "(request-target)";
pub const CONTENT_SHA256_HEADER: &str = "x-content-sha256";
pub const OBO_TOKEN_HEADER: &str = "opc-obo-token";

const DEFAULT_GENERIC_HEADERS: [&str; 3] = ["date", REQUEST_TARGET, "host"];
const DEFAULT_BODY_HEADERS: [&str; 3] = ["content-length", "content-type", CONTENT_SHA256_HEADER];

#[derive(Debug, Error)]
#[error("{message}")]
pub struct SigningError {
    message: String,
}

impl SigningError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Signs outgoing requests with the key material of a [`ConfigurationProvider`].
#[derive(Clone)]
pub struct RequestSigner {
    provider: Arc<dyn ConfigurationProvider>,
    generic_headers: Vec<String>,
    body_headers: Vec<String>,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RequestSigner")
            .field("generic_headers", &self.generic_headers)
            .field("body_headers", &self.body_headers)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    pub fn new(provider: Arc<dyn ConfigurationProvider>) -> Self {
        Self {
            provider,
            generic_headers: DEFAULT_GENERIC_HEADERS.iter().map(|name| (*name).to_owned()).collect(),
            body_headers: DEFAULT_BODY_HEADERS.iter().map(|name| (*name).to_owned()).collect(),
        }
    }

    /// Signs a custom header set. Names are lowercased; `(request-target)` is allowed.
    pub fn with_headers<G, B>(provider: Arc<dyn ConfigurationProvider>, generic: G, body: B) -> Self
    where
        G: IntoIterator,
        G::Item: AsRef<str>,
        B: IntoIterator,
        B::Item: AsRef<str>,
    {
        Self {
            provider,
            generic_headers: generic
                .into_iter()
                .map(|name| name.as_ref().to_ascii_lowercase())
                .collect(),
            body_headers: body
                .into_iter()
                .map(|name| name.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn provider(&self) -> &Arc<dyn ConfigurationProvider> {
        &self.provider
    }

    /// Adds the signer-owned headers and the `Authorization` header in place.
    ///
    /// `date` and `host` are kept when already present. Body headers are always
    /// recomputed from the current body.
    pub fn sign(&self, request: &mut Request<Bytes>) -> Result<(), SigningError> {
        let key_id = self
            .provider
            .key_id()
            .map_err(|error| SigningError::new(format!("key id unavailable: {error}")))?;
        let private_key = self
            .provider
            .private_key()
            .map_err(|error| SigningError::new(format!("private key unavailable: {error}")))?;
        let delegation_token = self
            .provider
            .delegation_token()
            .map_err(|error| SigningError::new(format!("delegation token unavailable: {error}")))?;

        let signs_body = method_signs_body(request.method());
        let body_digest = signs_body.then(|| STANDARD.encode(Sha256::digest(request.body())));
        let body_len = request.body().len();
        let host = request
            .uri()
            .authority()
            .map(|authority| authority.as_str().to_owned());

        let headers = request.headers_mut();
        if !headers.contains_key(DATE) {
            headers.insert(DATE, header_value(&httpdate::fmt_http_date(SystemTime::now()))?);
        }
        if !headers.contains_key(HOST) {
            let host = host.ok_or_else(|| SigningError::new("request uri has no host"))?;
            headers.insert(HOST, header_value(&host)?);
        }
        if let Some(digest) = &body_digest {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body_len));
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            headers.insert(
                HeaderName::from_static(CONTENT_SHA256_HEADER),
                header_value(digest)?,
            );
        }
        if let Some(token) = &delegation_token {
            headers.insert(HeaderName::from_static(OBO_TOKEN_HEADER), header_value(token)?);
        }

        let mut signed_headers: Vec<&str> = self.generic_headers.iter().map(String::as_str).collect();
        if signs_body {
            signed_headers.extend(self.body_headers.iter().map(String::as_str));
        }
        if delegation_token.is_some() {
            signed_headers.push(OBO_TOKEN_HEADER);
        }

        let signing_string = signing_string(request, &signed_headers)?;
        let hashed = Sha256::digest(signing_string.as_bytes());
        let signature = private_key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &hashed)
            .map_err(|error| SigningError::new(format!("rsa signing failed: {error}")))?;

        let authorization = format!(
            "Signature version=\"1\",keyId=\"{key_id}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
            signed_headers.join(" "),
            STANDARD.encode(signature),
        );
        let mut authorization = header_value(&authorization)?;
        authorization.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, authorization);
        Ok(())
    }
}

/// PUT, POST and PATCH carry a signed body; every other method signs headers only.
pub fn method_signs_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Builds the newline-joined `name: value` lines covered by the signature.
pub fn signing_string<B>(request: &Request<B>, signed_headers: &[&str]) -> Result<String, SigningError> {
    let mut lines = Vec::with_capacity(signed_headers.len());
    for name in signed_headers {
        if *name == REQUEST_TARGET {
            let target = request
                .uri()
                .path_and_query()
                .map(|path| path.as_str())
                .unwrap_or("/");
            lines.push(format!(
                "{REQUEST_TARGET}: {} {target}",
                request.method().as_str().to_ascii_lowercase()
            ));
            continue;
        }
        let value = request
            .headers()
            .get(*name)
            .ok_or_else(|| SigningError::new(format!("header {name} is required for signing")))?
            .to_str()
            .map_err(|_| SigningError::new(format!("header {name} is not valid ascii")))?;
        lines.push(format!("{name}: {value}"));
    }
    Ok(lines.join("\n"))
}

fn header_value(value: &str) -> Result<HeaderValue, SigningError> {
    HeaderValue::from_str(value)
        .map_err(|error| SigningError::new(format!("invalid header value: {error}")))
}
