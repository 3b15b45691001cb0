use reqwest::Method;

use crate::{codes, retry_allowed::is_retry_allowed, RequestError};

const SAFE_METHODS: [Method; 3] = [Method::GET, Method::HEAD, Method::OPTIONS];

const IDEMPOTENT_METHODS: [Method; 5] = [
    Method::GET,
    Method::HEAD,
    Method::OPTIONS,
    Method::PUT,
    Method::DELETE,
];

/// Decides whether a failed request is eligible for another attempt.
pub trait RetryCondition: Send + Sync {
    /// Returns `true` when `error` should be retried.
    fn should_retry(&self, error: &RequestError) -> bool;
}

impl<F> RetryCondition for F
where
    F: Fn(&RequestError) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &RequestError) -> bool {
        self(error)
    }
}

/// Failure without a server reply whose code is safe to retry.
///
/// Aborted requests (cancellation and timeout) are excluded. The request
/// config is not consulted, so an error without one can still qualify.
pub fn is_network_error(error: &RequestError) -> bool {
    if error.response.is_some() {
        return false;
    }
    match error.code.as_deref() {
        Some(code) if !code.is_empty() => code != codes::ECONNABORTED && is_retry_allowed(code),
        _ => false,
    }
}

/// Failure that is not an abort and either got no reply or a 5xx reply.
pub fn is_retryable_error(error: &RequestError) -> bool {
    if error.is_aborted() {
        return false;
    }
    match &error.response {
        None => true,
        Some(response) => (500..=599).contains(&response.status.as_u16()),
    }
}

/// Retryable failure of a request without side effects (GET, HEAD, OPTIONS).
pub fn is_safe_request_error(error: &RequestError) -> bool {
    method_in(error, &SAFE_METHODS) && is_retryable_error(error)
}

/// Retryable failure of a request that can be repeated safely
/// (GET, HEAD, OPTIONS, PUT, DELETE).
pub fn is_idempotent_request_error(error: &RequestError) -> bool {
    method_in(error, &IDEMPOTENT_METHODS) && is_retryable_error(error)
}

/// Default retry condition: a network error, or a retryable failure of an
/// idempotent request.
pub fn is_network_or_idempotent_request_error(error: &RequestError) -> bool {
    is_network_error(error) || is_idempotent_request_error(error)
}

fn method_in(error: &RequestError, methods: &[Method]) -> bool {
    error
        .config
        .as_deref()
        .is_some_and(|config| methods.contains(&config.method))
}
