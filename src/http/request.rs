//! Request and response values passed through the engine
//!
//! A [`RequestSpec`] is rebuilt from the call arguments for every attempt,
//! then mutated in place by the auth strategy and pre-request hooks before
//! it is turned into a `reqwest::Request`.

use crate::error::{Error, Result};
use crate::types::{query_pairs, JsonValue, Params};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

// ============================================================================
// Request Spec
// ============================================================================

/// Request body
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// JSON-encoded body
    Json(JsonValue),
    /// `application/x-www-form-urlencoded` body
    Form(Vec<(String, String)>),
}

/// Everything needed to send one attempt
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// HTTP method
    pub method: Method,
    /// Absolute URL, without the query parameters below
    pub url: Url,
    /// Query parameters
    pub params: Params,
    /// Optional body
    pub body: Option<RequestBody>,
    /// Request headers
    pub headers: HeaderMap,
}

impl RequestSpec {
    /// Create a spec with no parameters, body or headers
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            params: Params::new(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    /// Set a header, replacing any previous value
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::validation(format!("Invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::validation(format!("Invalid value for header '{name}': {e}")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Read a header as a string
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Build the transport request for this attempt
    pub(crate) fn build(&self, client: &Client, timeout: Duration) -> Result<reqwest::Request> {
        let mut req = client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone())
            .timeout(timeout);

        let pairs = query_pairs(&self.params);
        if !pairs.is_empty() {
            req = req.query(&pairs);
        }

        match &self.body {
            Some(RequestBody::Json(body)) => req = req.json(body),
            Some(RequestBody::Form(form)) => req = req.form(form),
            None => {}
        }

        req.build()
            .map_err(|e| Error::validation(format!("Failed to build request for {}: {e}", self.url)))
    }
}

// ============================================================================
// Request Options
// ============================================================================

/// Per-call options for [`ApiClient::request`](super::ApiClient::request)
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query parameters
    pub params: Params,
    /// Request body
    pub body: Option<RequestBody>,
    /// Extra headers for this call
    pub headers: HashMap<String, String>,
    /// Use this base URL instead of the client's
    pub base_url_override: Option<String>,
}

impl RequestOptions {
    /// Create empty request options
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query parameter
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Merge a set of query parameters
    #[must_use]
    pub fn params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set JSON body
    #[must_use]
    pub fn json(mut self, body: JsonValue) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Set form body
    #[must_use]
    pub fn form<K: Into<String>, V: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.body = Some(RequestBody::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ));
        self
    }

    /// Send this call to a different base URL
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into());
        self
    }
}

// ============================================================================
// Responses
// ============================================================================

/// A fully buffered HTTP response
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Final URL of the request
    pub url: Url,
    /// Response body
    pub body: Bytes,
}

impl RawResponse {
    /// Read the whole body of a transport response
    pub(crate) async fn read(response: reqwest::Response, timeout: Duration) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::from_transport(&e, url.as_str(), timeout))?;

        Ok(Self {
            status,
            headers,
            url,
            body,
        })
    }

    /// Check for a 2xx status
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as (lossy) UTF-8 text
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Result of [`ApiClient::request`](super::ApiClient::request)
#[derive(Debug)]
pub enum ApiResponse<T> {
    /// Body parsed into the expected type
    Parsed(Arc<T>),
    /// Body could not be parsed; the raw response is returned instead
    Raw(RawResponse),
}

impl<T> ApiResponse<T> {
    /// Check whether the body was parsed
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }

    /// Borrow the parsed value
    pub fn parsed(&self) -> Option<&Arc<T>> {
        match self {
            Self::Parsed(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    /// Take the parsed value
    pub fn into_parsed(self) -> Option<Arc<T>> {
        match self {
            Self::Parsed(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    /// Borrow the raw response
    pub fn raw(&self) -> Option<&RawResponse> {
        match self {
            Self::Parsed(_) => None,
            Self::Raw(raw) => Some(raw),
        }
    }
}

impl<T> Clone for ApiResponse<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Parsed(value) => Self::Parsed(Arc::clone(value)),
            Self::Raw(raw) => Self::Raw(raw.clone()),
        }
    }
}
