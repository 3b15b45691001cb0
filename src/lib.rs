//! `reqwest-retry-hooks` adds automatic retries to an async HTTP client.
//!
//! [`attach_retry_policy`] registers two interceptors on an [`HttpClient`]:
//! - a pre-request hook that stamps every attempt
//! - a post-failure hook that classifies the error, waits, shrinks the
//!   remaining timeout budget and re-issues the request
//!
//! Classifiers ([`is_network_error`], [`is_retryable_error`],
//! [`is_safe_request_error`], [`is_idempotent_request_error`],
//! [`is_network_or_idempotent_request_error`]) and delays
//! ([`exponential_delay`]) are plain functions usable on their own.
//!
//! ```no_run
//! use reqwest_retry_hooks::{attach_retry_policy, ExponentialDelay, HttpClient, RetryOptions};
//!
//! # async fn run() -> reqwest_retry_hooks::Result<()> {
//! let client = HttpClient::default();
//! attach_retry_policy(
//!     &client,
//!     RetryOptions::new()
//!         .retries(3)
//!         .retry_delay(ExponentialDelay::default()),
//! );
//! let response = client.get("https://api.example.com/items").await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

mod classify;
mod client;
mod config;
mod delay;
mod error;
mod interceptor;
mod options;
mod policy;
mod response;
mod retry;
mod retry_allowed;
mod state;
mod transport;

pub use classify::{
    is_idempotent_request_error, is_network_error, is_network_or_idempotent_request_error,
    is_retryable_error, is_safe_request_error, RetryCondition,
};
pub use client::HttpClient;
pub use config::{json_transform, Agent, RequestBody, RequestConfig, TransformRequest};
pub use delay::{
    exponential_delay, exponential_delay_with_factor, no_delay, ExponentialDelay, NoDelay,
    RetryDelay, DEFAULT_DELAY_FACTOR_MS,
};
pub use error::{codes, BoxError, ErrorResponse, RequestError};
pub use interceptor::{InterceptorId, RequestInterceptor, ResponseInterceptor};
pub use options::{ClientOptions, ValidateStatus};
pub use policy::{DelayKind, OnRetry, RetryOptions, RetryPolicy, RetryProfile, DEFAULT_RETRIES};
pub use response::HttpResponse;
pub use retry::{attach_retry_policy, AttachedRetryPolicy};
pub use retry_allowed::is_retry_allowed;
pub use state::RetryState;
pub use transport::{ReqwestTransport, Transport};

pub type Result<T> = std::result::Result<T, RequestError>;
