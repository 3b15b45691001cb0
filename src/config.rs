use std::{fmt, sync::Arc};

use bytes::Bytes;
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Method,
};
use tokio_util::sync::CancellationToken;

use crate::{RetryOptions, RetryState};

/// Outgoing request body.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// JSON document, serialised by the default request transform.
    Json(serde_json::Value),
    /// UTF-8 text.
    Text(String),
    /// Already encoded bytes, sent unchanged.
    Bytes(Bytes),
}

impl RequestBody {
    /// Returns `true` when there is nothing to send.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.is_empty(),
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Json(_) => false,
        }
    }
}

/// Request body transform applied by the client before each dispatch.
pub type TransformRequest =
    Arc<dyn Fn(RequestBody, &mut HeaderMap) -> RequestBody + Send + Sync + 'static>;

/// Serialises JSON bodies and sets `content-type` when absent.
pub fn json_transform() -> TransformRequest {
    Arc::new(|body, headers| match body {
        RequestBody::Json(value) => {
            headers
                .entry(header::CONTENT_TYPE)
                .or_insert(HeaderValue::from_static("application/json"));
            // Serialising a `serde_json::Value` cannot fail.
            let encoded = serde_json::to_vec(&value).unwrap_or_default();
            RequestBody::Bytes(Bytes::from(encoded))
        }
        other => other,
    })
}

/// Shared connection agent used instead of the client's default connection pool.
///
/// Agents compare by identity: two handles are equal only when they were
/// cloned from the same instance.
#[derive(Clone)]
pub struct Agent(Arc<reqwest::Client>);

impl Agent {
    /// Wraps a configured `reqwest` client.
    pub fn new(client: reqwest::Client) -> Self {
        Self(Arc::new(client))
    }

    /// Underlying `reqwest` client.
    pub fn client(&self) -> &reqwest::Client {
        &self.0
    }

    /// Returns `true` when both handles refer to the same agent.
    pub fn ptr_eq(&self, other: &Agent) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Agent").field(&Arc::as_ptr(&self.0)).finish()
    }
}

/// Configuration of a single logical request.
///
/// The config is moved through the client pipeline and handed back inside
/// [`crate::RequestError::config`] on failure, so retry state stored here
/// follows one logical request across every attempt.
#[derive(Clone)]
pub struct RequestConfig {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL, or a path resolved against the client's base URL.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: RequestBody,
    /// Timeout budget in milliseconds. `None` or `Some(0)` disables it.
    pub timeout_ms: Option<u64>,
    /// Agent used for plain `http` URLs.
    pub http_agent: Option<Agent>,
    /// Agent used for `https` URLs.
    pub https_agent: Option<Agent>,
    /// Body transforms. `None` inherits the client's defaults.
    pub transform_request: Option<Vec<TransformRequest>>,
    /// Cancels the request when triggered.
    pub cancel: Option<CancellationToken>,
    /// Retry options overriding the client-wide policy for this request.
    pub retry: Option<RetryOptions>,
    pub(crate) retry_state: Option<RetryState>,
}

impl RequestConfig {
    /// Creates a config for `method` and `url` with everything else unset.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            timeout_ms: None,
            http_agent: None,
            https_agent: None,
            transform_request: None,
            cancel: None,
            retry: None,
            retry_state: None,
        }
    }

    /// Sets a header, replacing any previous value.
    pub fn header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a JSON body.
    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    /// Sets the request body.
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Sets the timeout budget in milliseconds.
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Attaches a cancellation token.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Overrides the client-wide retry policy for this request.
    pub fn retry(mut self, options: RetryOptions) -> Self {
        self.retry = Some(options);
        self
    }

    /// Replaces the body transforms for this request.
    pub fn transform_request(mut self, transforms: Vec<TransformRequest>) -> Self {
        self.transform_request = Some(transforms);
        self
    }

    /// Retry bookkeeping for this request, if any attempt has been made.
    pub fn retry_state(&self) -> Option<&RetryState> {
        self.retry_state.as_ref()
    }

    /// Effective timeout, treating `Some(0)` as no timeout.
    pub fn effective_timeout_ms(&self) -> Option<u64> {
        self.timeout_ms.filter(|timeout| *timeout > 0)
    }

    pub(crate) fn is_https(&self) -> bool {
        self.url
            .get(..8)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"))
    }
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("timeout_ms", &self.timeout_ms)
            .field("http_agent", &self.http_agent)
            .field("https_agent", &self.https_agent)
            .field(
                "transform_request",
                &self.transform_request.as_ref().map(Vec::len),
            )
            .field("retry", &self.retry)
            .field("retry_state", &self.retry_state)
            .finish()
    }
}
