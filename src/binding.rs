//! Request and response binding contracts implemented by generated operation code.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use http::{Method, Request};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;
use crate::body::BinaryBody;
use crate::error::Error;
use crate::region::Endpoint;
use crate::response::RawResponse;
use crate::retry::RetryPolicy;
use crate::util::{parse_header_name, parse_header_value, truncate_body};

pub const OPC_REQUEST_ID_HEADER: &str = "opc-request-id";
pub const OPC_RETRY_TOKEN_HEADER: &str = "opc-retry-token";
pub const OPC_NEXT_PAGE_HEADER: &str = "opc-next-page";

/// Scalar rendering for path, query and header positions.
pub trait ParamValue {
    fn to_param(&self) -> String;
}

impl ParamValue for str {
    fn to_param(&self) -> String {
        self.to_owned()
    }
}

impl ParamValue for String {
    fn to_param(&self) -> String {
        self.clone()
    }
}

impl<T: ParamValue + ?Sized> ParamValue for &T {
    fn to_param(&self) -> String {
        (**self).to_param()
    }
}

impl ParamValue for bool {
    fn to_param(&self) -> String {
        let text = if *self { "true" } else { "false" };
        text.to_owned()
    }
}

macro_rules! display_param_value {
    ($($ty:ty),+) => {
        $(impl ParamValue for $ty {
            fn to_param(&self) -> String {
                self.to_string()
            }
        })+
    };
}

display_param_value!(i16, i32, i64, u16, u32, u64, usize, f32, f64);

/// RFC 3339 with millisecond precision, in UTC.
impl ParamValue for DateTime<Utc> {
    fn to_param(&self) -> String {
        self.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// How a list is rendered in a query string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CollectionFormat {
    /// `name=a,b,c`
    #[default]
    Csv,
    /// `name=a&name=b&name=c`
    Multi,
}

/// In-memory description of one outgoing call, filled by [`OciRequest::bind`].
#[derive(Debug)]
pub struct RequestDescriptor {
    operation: String,
    method: Method,
    path_template: String,
    path_params: BTreeMap<String, String>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl RequestDescriptor {
    pub fn new(operation: impl Into<String>, method: Method, path_template: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            method,
            path_template: path_template.into(),
            path_params: BTreeMap::new(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn path_param<V: ParamValue + ?Sized>(&mut self, name: &str, value: &V) -> &mut Self {
        self.path_params.insert(name.to_owned(), value.to_param());
        self
    }

    pub fn query<V: ParamValue + ?Sized>(&mut self, name: &str, value: &V) -> &mut Self {
        self.query.push((name.to_owned(), value.to_param()));
        self
    }

    /// Omitted entirely when `None`.
    pub fn query_opt<V: ParamValue>(&mut self, name: &str, value: Option<&V>) -> &mut Self {
        if let Some(value) = value {
            self.query(name, value);
        }
        self
    }

    /// Empty lists are omitted.
    pub fn query_list<V: ParamValue>(
        &mut self,
        name: &str,
        values: &[V],
        format: CollectionFormat,
    ) -> &mut Self {
        if values.is_empty() {
            return self;
        }
        match format {
            CollectionFormat::Csv => {
                let joined = values
                    .iter()
                    .map(ParamValue::to_param)
                    .collect::<Vec<_>>()
                    .join(",");
                self.query.push((name.to_owned(), joined));
            }
            CollectionFormat::Multi => {
                for value in values {
                    self.query.push((name.to_owned(), value.to_param()));
                }
            }
        }
        self
    }

    pub fn header<V: ParamValue + ?Sized>(&mut self, name: &str, value: &V) -> Result<&mut Self> {
        let header_name = parse_header_name(&self.operation, name)?;
        let header_value = parse_header_value(&self.operation, name, &value.to_param())?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    pub fn header_opt<V: ParamValue>(&mut self, name: &str, value: Option<&V>) -> Result<&mut Self> {
        if let Some(value) = value {
            self.header(name, value)?;
        }
        Ok(self)
    }

    /// One header per entry, named `{prefix}{key}`.
    pub fn header_collection<V: ParamValue>(
        &mut self,
        prefix: &str,
        values: &BTreeMap<String, V>,
    ) -> Result<&mut Self> {
        for (key, value) in values {
            self.header(&format!("{prefix}{key}"), value)?;
        }
        Ok(self)
    }

    pub fn json_body<T: Serialize + ?Sized>(&mut self, body: &T) -> Result<&mut Self> {
        let bytes = serde_json::to_vec(body).map_err(|source| Error::RequestBinding {
            operation: self.operation.clone(),
            message: format!("cannot serialize body: {source}"),
        })?;
        self.body = Some(Bytes::from(bytes));
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    pub(crate) fn binary_body(&mut self, bytes: Bytes, content_type: Option<&str>) -> Result<()> {
        let content_type = match content_type {
            Some(content_type) => parse_header_value(&self.operation, "content-type", content_type)?,
            None => HeaderValue::from_static("application/octet-stream"),
        };
        if !self.headers.contains_key(CONTENT_TYPE) {
            self.headers.insert(CONTENT_TYPE, content_type);
        }
        self.body = Some(bytes);
        Ok(())
    }

    pub(crate) fn merge_default_headers(&mut self, defaults: &HeaderMap) {
        for (name, value) in defaults {
            if !self.headers.contains_key(name) {
                self.headers.insert(name.clone(), value.clone());
            }
        }
    }

    /// Substitutes path parameters under the endpoint's base path and appends the query.
    pub fn build_url(&self, endpoint: &Endpoint) -> Result<url::Url> {
        let mut url = endpoint.url()?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| Error::RequestBinding {
                operation: self.operation.clone(),
                message: format!("endpoint {endpoint} cannot carry a path"),
            })?;
            segments.clear();
            segments.extend(endpoint.base_path().split('/').filter(|part| !part.is_empty()));
            for part in self.path_template.split('/').filter(|part| !part.is_empty()) {
                let Some(name) = part.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) else {
                    segments.push(part);
                    continue;
                };
                let value = self.path_params.get(name).ok_or_else(|| Error::RequestBinding {
                    operation: self.operation.clone(),
                    message: format!("missing path parameter {name}"),
                })?;
                if value.is_empty() {
                    return Err(Error::RequestBinding {
                        operation: self.operation.clone(),
                        message: format!("path parameter {name} is empty"),
                    });
                }
                segments.push(value);
            }
        }
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// Produces the unsigned request for one attempt.
    pub fn to_http_request(&self, endpoint: &Endpoint) -> Result<Request<Bytes>> {
        let url = self.build_url(endpoint)?;
        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(url.as_str());
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        builder
            .body(self.body.clone().unwrap_or_default())
            .map_err(|source| Error::RequestBinding {
                operation: self.operation.clone(),
                message: format!("cannot build http request: {source}"),
            })
    }
}

/// A typed request value for one operation.
pub trait OciRequest: Send {
    /// Fills path, query, header and body positions.
    fn bind(&self, request: &mut RequestDescriptor) -> Result<()>;

    /// Messages for every enum field holding a value outside its known set.
    fn invalid_enum_values(&self) -> Vec<String> {
        Vec::new()
    }

    fn retry_token(&self) -> Option<&str> {
        None
    }

    fn set_retry_token(&mut self, _token: String) {}

    /// Per-request policy, taking precedence over every other source.
    fn retry_policy(&self) -> Option<&RetryPolicy> {
        None
    }

    fn binary_body(&mut self) -> Option<&mut BinaryBody> {
        None
    }
}

/// Typed header decoding for response fields.
pub trait FromHeader: Sized {
    fn from_header(value: &str) -> Option<Self>;
}

impl FromHeader for String {
    fn from_header(value: &str) -> Option<Self> {
        Some(value.to_owned())
    }
}

impl FromHeader for bool {
    fn from_header(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }
}

macro_rules! parse_from_header {
    ($($ty:ty),+) => {
        $(impl FromHeader for $ty {
            fn from_header(value: &str) -> Option<Self> {
                value.trim().parse().ok()
            }
        })+
    };
}

parse_from_header!(i32, i64, u32, u64, f64);

impl FromHeader for DateTime<Utc> {
    fn from_header(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
            return Some(parsed.with_timezone(&Utc));
        }
        httpdate::parse_http_date(value).ok().map(DateTime::<Utc>::from)
    }
}

/// Read access to a 2xx response while a typed response is built from it.
#[derive(Debug)]
pub struct ResponseBinder {
    operation: String,
    raw: RawResponse,
}

impl ResponseBinder {
    pub(crate) fn new(operation: impl Into<String>, raw: RawResponse) -> Self {
        Self {
            operation: operation.into(),
            raw,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn raw(&self) -> &RawResponse {
        &self.raw
    }

    pub fn into_raw(self) -> RawResponse {
        self.raw
    }

    /// Missing header is `Ok(None)`; a present but undecodable one is an error.
    pub fn header<T: FromHeader>(&self, name: &str) -> Result<Option<T>> {
        let Some(value) = self.raw.headers().get(name) else {
            return Ok(None);
        };
        let text = value.to_str().map_err(|_| Error::ResponseBinding {
            operation: self.operation.clone(),
            message: format!("header {name} is not valid ascii"),
        })?;
        T::from_header(text)
            .map(Some)
            .ok_or_else(|| Error::ResponseBinding {
                operation: self.operation.clone(),
                message: format!("cannot decode header {name}: {text}"),
            })
    }

    pub fn opc_request_id(&self) -> Option<String> {
        self.raw.header(OPC_REQUEST_ID_HEADER).map(str::to_owned)
    }

    pub fn opc_next_page(&self) -> Option<String> {
        self.raw
            .header(OPC_NEXT_PAGE_HEADER)
            .filter(|page| !page.is_empty())
            .map(str::to_owned)
    }

    /// Decodes the JSON body; unknown fields are ignored by the target types.
    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(self.raw.body()).map_err(|source| Error::Deserialize {
            operation: self.operation.clone(),
            source,
            body: truncate_body(self.raw.body()),
        })
    }

    /// Like [`Self::json_body`] but an empty body yields `None`.
    pub fn json_body_opt<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        if self.raw.body().iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        self.json_body().map(Some)
    }
}

/// A typed response value for one operation.
pub trait OciResponse: Sized {
    fn from_response(response: ResponseBinder) -> Result<Self>;
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use http::{HeaderMap, HeaderValue, Method, StatusCode};
    use serde::Deserialize;

    use super::{CollectionFormat, RequestDescriptor, ResponseBinder};
    use crate::error::ErrorCode;
    use crate::region::Endpoint;
    use crate::response::RawResponse;

    fn endpoint() -> Endpoint {
        Endpoint::parse("https://iaas.us-ashburn-1.oraclecloud.com")
            .expect("endpoint")
            .with_base_path("20160918")
    }

    #[test]
    fn path_params_are_substituted_and_escaped() {
        let mut request = RequestDescriptor::new(
            "GetVolume",
            Method::GET,
            "/volumes/{volumeId}/actions/{action}",
        );
        request.path_param("volumeId", "ocid1.volume.oc1..a/b c");
        request.path_param("action", "changeCompartment");
        let url = request.build_url(&endpoint()).expect("url");
        assert_eq!(
            url.as_str(),
            "https://iaas.us-ashburn-1.oraclecloud.com/20160918/volumes/ocid1.volume.oc1..a%2Fb%20c/actions/changeCompartment"
        );
    }

    #[test]
    fn missing_or_empty_path_param_is_a_binding_error() {
        let request = RequestDescriptor::new("GetVolume", Method::GET, "/volumes/{volumeId}");
        let error = request.build_url(&endpoint()).expect_err("missing");
        assert_eq!(error.code(), ErrorCode::RequestBinding);
        assert_eq!(error.operation(), Some("GetVolume"));

        let mut request = RequestDescriptor::new("GetVolume", Method::GET, "/volumes/{volumeId}");
        request.path_param("volumeId", "");
        assert!(request.build_url(&endpoint()).is_err());
    }

    #[test]
    fn scalars_lists_and_optionals_marshal_into_query() {
        let mut request = RequestDescriptor::new("ListVolumes", Method::GET, "/volumes");
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).single().expect("timestamp");
        request
            .query("compartmentId", "ocid1.compartment.oc1..c")
            .query("limit", &25_i32)
            .query("isHydrated", &true)
            .query("timeCreatedGreaterThan", &created)
            .query_opt::<String>("page", None)
            .query_list("ids", &["a", "b"], CollectionFormat::Csv)
            .query_list("tag", &["x", "y"], CollectionFormat::Multi)
            .query_list::<&str>("empty", &[], CollectionFormat::Csv);
        let url = request.build_url(&endpoint()).expect("url");
        assert_eq!(
            url.query(),
            Some(
                "compartmentId=ocid1.compartment.oc1..c&limit=25&isHydrated=true&timeCreatedGreaterThan=2024-03-01T12%3A30%3A05.000Z&ids=a%2Cb&tag=x&tag=y"
            )
        );
    }

    #[test]
    fn headers_collections_and_json_body_are_bound() {
        let mut request = RequestDescriptor::new("CreateVolume", Method::POST, "/volumes");
        let mut meta = BTreeMap::new();
        meta.insert("team".to_owned(), "storage".to_owned());
        request.header("opc-retry-token", "tok").expect("header");
        request.header_opt::<String>("if-match", None).expect("optional header");
        request.header_collection("opc-meta-", &meta).expect("collection");
        request
            .json_body(&serde_json::json!({"displayName": "data"}))
            .expect("body");

        let http_request = request.to_http_request(&endpoint()).expect("request");
        assert_eq!(http_request.headers()["opc-retry-token"], "tok");
        assert_eq!(http_request.headers()["opc-meta-team"], "storage");
        assert_eq!(http_request.headers()["content-type"], "application/json");
        assert!(http_request.headers().get("if-match").is_none());
        assert_eq!(&http_request.body()[..], br#"{"displayName":"data"}"#);
    }

    #[test]
    fn invalid_header_value_is_rejected_with_operation() {
        let mut request = RequestDescriptor::new("CreateVolume", Method::POST, "/volumes");
        let error = request.header("opc-retry-token", "bad\nvalue").expect_err("newline");
        assert_eq!(error.operation(), Some("CreateVolume"));
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Item {
        id: String,
    }

    fn binder(headers: &[(&'static str, &'static str)], body: &'static str) -> ResponseBinder {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        ResponseBinder::new(
            "GetVolume",
            RawResponse::new(StatusCode::OK, map, Bytes::from_static(body.as_bytes())),
        )
    }

    #[test]
    fn response_headers_and_body_bind_to_typed_fields() {
        let response = binder(
            &[
                ("opc-request-id", "req-9"),
                ("opc-next-page", "page-2"),
                ("content-length", "42"),
                ("etag", "abc"),
            ],
            r#"{"id":"v1","unknownField":{"nested":true}}"#,
        );
        assert_eq!(response.opc_request_id().as_deref(), Some("req-9"));
        assert_eq!(response.opc_next_page().as_deref(), Some("page-2"));
        assert_eq!(response.header::<u64>("content-length").expect("length"), Some(42));
        assert_eq!(response.header::<String>("missing").expect("missing"), None);
        let item: Item = response.json_body().expect("body");
        assert_eq!(item.id, "v1");
    }

    #[test]
    fn undecodable_header_and_body_surface_operation() {
        let response = binder(&[("content-length", "many")], "not json");
        assert_eq!(
            response.header::<u64>("content-length").expect_err("bad header").code(),
            ErrorCode::ResponseBinding
        );
        let error = response.json_body::<Item>().expect_err("bad body");
        assert_eq!(error.code(), ErrorCode::Deserialize);
        assert_eq!(error.operation(), Some("GetVolume"));
    }

    #[test]
    fn empty_body_is_none_for_optional_binding() {
        let response = binder(&[], "");
        assert!(response.json_body_opt::<Item>().expect("empty").is_none());
    }
}
