use std::{fmt, sync::Arc};

use reqwest::{header::HeaderMap, StatusCode};

use crate::{json_transform, Agent, TransformRequest};

/// Decides whether a reply status counts as success.
pub type ValidateStatus = Arc<dyn Fn(StatusCode) -> bool + Send + Sync>;

/// Client-wide defaults merged into every request.
#[derive(Clone)]
pub struct ClientOptions {
    /// Base URL prepended to relative request URLs.
    pub base_url: Option<String>,
    /// Timeout in milliseconds for requests that set none. `0` disables it.
    pub timeout_ms: u64,
    /// Headers added to every request unless the request sets them.
    pub headers: HeaderMap,
    /// Default agent for `http` URLs.
    pub http_agent: Option<Agent>,
    /// Default agent for `https` URLs.
    pub https_agent: Option<Agent>,
    /// Body transforms for requests that set none.
    pub transform_request: Vec<TransformRequest>,
    /// Statuses accepted as success; anything else becomes an error.
    pub validate_status: ValidateStatus,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 0,
            headers: HeaderMap::new(),
            http_agent: None,
            https_agent: None,
            transform_request: vec![json_transform()],
            validate_status: Arc::new(|status: StatusCode| status.is_success()),
        }
    }
}

impl ClientOptions {
    /// Sets the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the default timeout in milliseconds.
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the default `http` agent.
    pub fn http_agent(mut self, agent: Agent) -> Self {
        self.http_agent = Some(agent);
        self
    }

    /// Sets the default `https` agent.
    pub fn https_agent(mut self, agent: Agent) -> Self {
        self.https_agent = Some(agent);
        self
    }

    /// Replaces the status validation predicate.
    pub fn validate_status(
        mut self,
        validate: impl Fn(StatusCode) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.validate_status = Arc::new(validate);
        self
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Header values may hold credentials; only names are shown.
        let header_names: Vec<_> = self.headers.keys().map(|name| name.as_str()).collect();
        f.debug_struct("ClientOptions")
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("headers", &header_names)
            .field("http_agent", &self.http_agent)
            .field("https_agent", &self.https_agent)
            .field("transform_request", &self.transform_request.len())
            .finish_non_exhaustive()
    }
}
