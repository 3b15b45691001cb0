use std::{fmt, mem, sync::Arc};

use reqwest::Method;

use crate::{
    interceptor::Interceptors, ClientOptions, ErrorResponse, HttpResponse, InterceptorId,
    RequestConfig, RequestError, RequestInterceptor, ResponseInterceptor, ReqwestTransport,
    Result, Transport,
};

/// Async HTTP client with request and response interceptor chains.
///
/// Cloning is cheap; clones share defaults, transport and interceptors.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    options: ClientOptions,
    transport: Arc<dyn Transport>,
    request_interceptors: Interceptors<dyn RequestInterceptor>,
    response_interceptors: Interceptors<dyn ResponseInterceptor>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("options", &self.inner.options)
            .field(
                "request_interceptors",
                &self.inner.request_interceptors.snapshot().len(),
            )
            .field(
                "response_interceptors",
                &self.inner.response_interceptors.snapshot().len(),
            )
            .finish_non_exhaustive()
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(ClientOptions::default())
    }
}

impl HttpClient {
    /// Creates a client sending through `reqwest`.
    pub fn new(options: ClientOptions) -> Self {
        Self::with_transport(options, ReqwestTransport::new())
    }

    /// Creates a client sending through a custom transport.
    pub fn with_transport(options: ClientOptions, transport: impl Transport + 'static) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                options,
                transport: Arc::new(transport),
                request_interceptors: Interceptors::default(),
                response_interceptors: Interceptors::default(),
            }),
        }
    }

    /// Client-wide defaults.
    pub fn defaults(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Registers a hook run before every attempt.
    ///
    /// Request interceptors run in reverse registration order: the most
    /// recently registered one sees the config first.
    pub fn register_request_interceptor(
        &self,
        interceptor: Arc<dyn RequestInterceptor>,
    ) -> InterceptorId {
        self.inner.request_interceptors.register(interceptor)
    }

    /// Registers a hook run after every attempt, in registration order.
    pub fn register_response_interceptor(
        &self,
        interceptor: Arc<dyn ResponseInterceptor>,
    ) -> InterceptorId {
        self.inner.response_interceptors.register(interceptor)
    }

    /// Removes a request interceptor. Returns `false` if it was not registered.
    pub fn eject_request_interceptor(&self, id: InterceptorId) -> bool {
        self.inner.request_interceptors.eject(id)
    }

    /// Removes a response interceptor. Returns `false` if it was not registered.
    pub fn eject_response_interceptor(&self, id: InterceptorId) -> bool {
        self.inner.response_interceptors.eject(id)
    }

    /// Sends a `GET` request.
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(RequestConfig::new(Method::GET, url)).await
    }

    /// Sends a `HEAD` request.
    pub async fn head(&self, url: &str) -> Result<HttpResponse> {
        self.request(RequestConfig::new(Method::HEAD, url)).await
    }

    /// Sends an `OPTIONS` request.
    pub async fn options(&self, url: &str) -> Result<HttpResponse> {
        self.request(RequestConfig::new(Method::OPTIONS, url)).await
    }

    /// Sends a `DELETE` request.
    pub async fn delete(&self, url: &str) -> Result<HttpResponse> {
        self.request(RequestConfig::new(Method::DELETE, url)).await
    }

    /// Sends a `POST` request with a JSON body.
    pub async fn post(&self, url: &str, body: serde_json::Value) -> Result<HttpResponse> {
        self.request(RequestConfig::new(Method::POST, url).json(body))
            .await
    }

    /// Sends a `PUT` request with a JSON body.
    pub async fn put(&self, url: &str, body: serde_json::Value) -> Result<HttpResponse> {
        self.request(RequestConfig::new(Method::PUT, url).json(body))
            .await
    }

    /// Sends a `PATCH` request with a JSON body.
    pub async fn patch(&self, url: &str, body: serde_json::Value) -> Result<HttpResponse> {
        self.request(RequestConfig::new(Method::PATCH, url).json(body))
            .await
    }

    /// Sends `config` through the full pipeline.
    ///
    /// Defaults are merged in, request interceptors run, the body transforms
    /// are applied, the transport is called and finally the outcome is passed
    /// through the response interceptors. Calling this again with a config
    /// taken from a [`RequestError`] re-issues that same logical request.
    pub async fn request(&self, config: RequestConfig) -> Result<HttpResponse> {
        let mut outcome = self.dispatch(config).await;
        for interceptor in self.inner.response_interceptors.snapshot() {
            outcome = match outcome {
                Ok(response) => interceptor.on_response(response).await,
                Err(error) => interceptor.on_error(self, error).await,
            };
        }
        outcome
    }

    async fn dispatch(&self, config: RequestConfig) -> Result<HttpResponse> {
        let mut config = self.merge_defaults(config);
        for interceptor in self.inner.request_interceptors.snapshot().iter().rev() {
            config = interceptor.on_request(config)?;
        }

        // The transformed body is stored back so a re-issued config already
        // carries the encoded payload.
        let transforms = config.transform_request.clone().unwrap_or_default();
        let body = mem::take(&mut config.body);
        config.body = transforms
            .iter()
            .fold(body, |body, transform| transform(body, &mut config.headers));

        match self.inner.transport.send(&config).await {
            Ok(response) if (self.inner.options.validate_status)(response.status) => Ok(response),
            Ok(response) => Err(RequestError::status(ErrorResponse {
                status: response.status,
                headers: response.headers,
                body: response.body,
            })
            .with_config(config)),
            Err(error) => Err(error.with_config(config)),
        }
    }

    fn merge_defaults(&self, mut config: RequestConfig) -> RequestConfig {
        let options = &self.inner.options;

        if let Some(base_url) = options.base_url.as_deref() {
            if !is_absolute_url(&config.url) {
                config.url = join_base_path(base_url, &config.url);
            }
        }
        if config.timeout_ms.is_none() && options.timeout_ms > 0 {
            config.timeout_ms = Some(options.timeout_ms);
        }
        for name in options.headers.keys() {
            if !config.headers.contains_key(name) {
                for value in options.headers.get_all(name) {
                    config.headers.append(name.clone(), value.clone());
                }
            }
        }
        if config.http_agent.is_none() {
            config.http_agent = options.http_agent.clone();
        }
        if config.https_agent.is_none() {
            config.https_agent = options.https_agent.clone();
        }
        if config.transform_request.is_none() {
            config.transform_request = Some(options.transform_request.clone());
        }
        config
    }
}

fn is_absolute_url(url: &str) -> bool {
    url.find("://").is_some_and(|index| {
        index > 0
            && url[..index]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

fn join_base_path(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let relative = path.trim_start_matches('/');
    match (base.is_empty(), relative.is_empty()) {
        (true, true) => String::new(),
        (true, false) => relative.to_owned(),
        (false, true) => base.to_owned(),
        (false, false) => format!("{base}/{relative}"),
    }
}
