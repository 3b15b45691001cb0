use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{codes, Agent, HttpResponse, RequestBody, RequestConfig, RequestError, Result};

/// Sends a single request attempt.
///
/// Implementations return any server reply as `Ok`, whatever its status;
/// status validation happens in [`crate::HttpClient`]. Errors describe
/// failures where no complete reply was received.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one attempt for `config`.
    async fn send(&self, config: &RequestConfig) -> Result<HttpResponse>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default `reqwest` client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport around an existing `reqwest` client.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn client_for<'a>(&'a self, config: &'a RequestConfig) -> &'a reqwest::Client {
        let agent = if config.is_https() {
            config.https_agent.as_ref()
        } else {
            config.http_agent.as_ref()
        };
        agent.map_or(&self.http, Agent::client)
    }

    async fn perform(&self, config: &RequestConfig) -> Result<HttpResponse> {
        let url = reqwest::Url::parse(&config.url).map_err(|err| {
            RequestError::new(format!("invalid request URL '{}': {err}", config.url))
                .with_code(codes::ERR_INVALID_URL)
                .with_source(err)
        })?;

        let mut request = self
            .client_for(config)
            .request(config.method.clone(), url)
            .headers(config.headers.clone());

        if let Some(timeout_ms) = config.effective_timeout_ms() {
            request = request.timeout(Duration::from_millis(timeout_ms));
        }

        request = match &config.body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.json(value),
            RequestBody::Text(text) => request.body(text.clone()),
            RequestBody::Bytes(bytes) => request.body(bytes.clone()),
        };

        let response = request
            .send()
            .await
            .map_err(|err| map_reqwest_error(err, config))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body: Bytes = response
            .bytes()
            .await
            .map_err(|err| map_reqwest_error(err, config))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, config: &RequestConfig) -> Result<HttpResponse> {
        let Some(cancel) = &config.cancel else {
            return self.perform(config).await;
        };
        if cancel.is_cancelled() {
            return Err(canceled());
        }
        tokio::select! {
            result = self.perform(config) => result,
            _ = cancel.cancelled() => Err(canceled()),
        }
    }
}

fn canceled() -> RequestError {
    RequestError::network(codes::ECONNABORTED, "request canceled")
}

fn map_reqwest_error(err: reqwest::Error, config: &RequestConfig) -> RequestError {
    if err.is_timeout() {
        let message = match config.effective_timeout_ms() {
            Some(timeout_ms) => format!("timeout of {timeout_ms}ms exceeded"),
            None => "request timed out".to_owned(),
        };
        return RequestError::network(codes::ECONNABORTED, message).with_source(err);
    }

    let code = transport_error_code(&err);

    #[cfg(feature = "tracing")]
    tracing::debug!(code, method = %config.method, url = %config.url, "transport failure: {err}");

    RequestError::network(code, err.to_string()).with_source(err)
}

/// Maps a `reqwest` failure onto a symbolic code.
fn transport_error_code(err: &reqwest::Error) -> &'static str {
    let text = error_chain_text(err);
    if err.is_connect() {
        if text.contains("dns")
            || text.contains("name or service not known")
            || text.contains("failed to lookup address")
        {
            return codes::ENOTFOUND;
        }
        if text.contains("certificate") {
            return "CERT_REJECTED";
        }
        if text.contains("tls") || text.contains("handshake") {
            return "UNABLE_TO_VERIFY_LEAF_SIGNATURE";
        }
        return codes::ECONNREFUSED;
    }
    if err.is_decode() {
        return codes::ERR_BAD_RESPONSE;
    }
    if err.is_request()
        || err.is_body()
        || text.contains("connection reset")
        || text.contains("broken pipe")
        || text.contains("unexpected eof")
    {
        return codes::ECONNRESET;
    }
    codes::ERR_NETWORK
}

fn error_chain_text(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text.to_ascii_lowercase()
}
