use std::fmt;

use bytes::Bytes;
use reqwest::{header::HeaderMap, StatusCode};

use crate::RequestConfig;

/// Boxed error stored as the underlying cause of a [`RequestError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Symbolic failure codes attached to [`RequestError::code`].
pub mod codes {
    /// Request aborted: either cancelled by the caller or timed out.
    ///
    /// This is never treated as a retryable network error.
    pub const ECONNABORTED: &str = "ECONNABORTED";
    /// Connection could not be established.
    pub const ECONNREFUSED: &str = "ECONNREFUSED";
    /// Connection dropped while sending the request or reading the body.
    pub const ECONNRESET: &str = "ECONNRESET";
    /// Host name could not be resolved.
    pub const ENOTFOUND: &str = "ENOTFOUND";
    /// Server replied with a status rejected by `validate_status`.
    pub const ERR_BAD_RESPONSE: &str = "ERR_BAD_RESPONSE";
    /// Request URL could not be parsed.
    pub const ERR_INVALID_URL: &str = "ERR_INVALID_URL";
    /// Transport failure without a more specific classification.
    pub const ERR_NETWORK: &str = "ERR_NETWORK";
}

/// Server reply attached to a failed request.
#[derive(Clone, Debug)]
pub struct ErrorResponse {
    /// HTTP status code returned by the server.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw response body.
    pub body: Bytes,
}

/// Error produced when a request attempt fails.
///
/// `response` is present only when a server replied. `config` points back to
/// the request that failed and is required for any retry decision.
#[derive(thiserror::Error)]
#[error("{message}")]
pub struct RequestError {
    /// Human readable description.
    pub message: String,
    /// Low-level symbolic failure code, see [`codes`].
    pub code: Option<String>,
    /// Server reply, if one was received.
    pub response: Option<ErrorResponse>,
    /// Request that produced this error.
    pub config: Option<Box<RequestConfig>>,
    #[source]
    source: Option<BoxError>,
}

impl RequestError {
    /// Creates an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            response: None,
            config: None,
            source: None,
        }
    }

    /// Creates a transport-level error with a symbolic code and no response.
    pub fn network(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(message).with_code(code)
    }

    /// Creates an error for a server reply with an unaccepted status.
    pub fn status(response: ErrorResponse) -> Self {
        let message = format!("request failed with status code {}", response.status.as_u16());
        Self::new(message)
            .with_code(codes::ERR_BAD_RESPONSE)
            .with_response(response)
    }

    /// Sets the symbolic failure code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attaches the server reply.
    pub fn with_response(mut self, response: ErrorResponse) -> Self {
        self.response = Some(response);
        self
    }

    /// Attaches the request that produced the failure.
    pub fn with_config(mut self, config: RequestConfig) -> Self {
        self.config = Some(Box::new(config));
        self
    }

    /// Attaches the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Status code of the server reply, if any.
    pub fn status_code(&self) -> Option<StatusCode> {
        self.response.as_ref().map(|response| response.status)
    }

    /// Returns `true` when the request was aborted (cancelled or timed out).
    pub fn is_aborted(&self) -> bool {
        self.code.as_deref() == Some(codes::ECONNABORTED)
    }
}

impl fmt::Debug for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestError")
            .field("message", &self.message)
            .field("code", &self.code)
            .field("status", &self.status_code())
            .field(
                "request",
                &self
                    .config
                    .as_deref()
                    .map(|config| format!("{} {}", config.method, config.url)),
            )
            .field("source", &self.source)
            .finish()
    }
}
