use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::{sleep, Instant};

use crate::{
    ClientOptions, HttpClient, HttpResponse, InterceptorId, RequestConfig, RequestError,
    RequestInterceptor, ResponseInterceptor, Result, RetryOptions, RetryPolicy, RetryState,
};

/// Registers the retry hooks on `client`.
///
/// `defaults` is the client-wide policy; any request may override it field by
/// field through [`RequestConfig::retry`].
pub fn attach_retry_policy(client: &HttpClient, defaults: RetryOptions) -> AttachedRetryPolicy {
    let hooks = Arc::new(RetryHooks { defaults });
    let request_id = client.register_request_interceptor(hooks.clone());
    let response_id = client.register_response_interceptor(hooks);
    AttachedRetryPolicy {
        request_id,
        response_id,
    }
}

/// Interceptor ids of an attached retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachedRetryPolicy {
    /// Id of the pre-request hook.
    pub request_id: InterceptorId,
    /// Id of the post-failure hook.
    pub response_id: InterceptorId,
}

impl AttachedRetryPolicy {
    /// Removes both hooks from `client`.
    pub fn detach(self, client: &HttpClient) {
        client.eject_request_interceptor(self.request_id);
        client.eject_response_interceptor(self.response_id);
    }
}

struct RetryHooks {
    defaults: RetryOptions,
}

impl RequestInterceptor for RetryHooks {
    fn on_request(&self, mut config: RequestConfig) -> Result<RequestConfig> {
        RetryState::get_or_init(&mut config).last_request_at = Some(Instant::now());
        Ok(config)
    }
}

#[async_trait]
impl ResponseInterceptor for RetryHooks {
    async fn on_error(&self, client: &HttpClient, mut error: RequestError) -> Result<HttpResponse> {
        let Some(config) = error.config.as_deref() else {
            return Err(error);
        };
        let policy = RetryPolicy::resolve(&self.defaults, config.retry.as_ref());
        let retries_so_far = config.retry_state().map_or(0, RetryState::attempt_count);

        let should_retry =
            policy.retry_condition.should_retry(&error) && retries_so_far < policy.max_retries;
        if !should_retry {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                method = %config.method,
                url = %config.url,
                retries = retries_so_far,
                "not retrying request: {error}"
            );
            return Err(error);
        }

        let Some(config) = error.config.as_deref_mut() else {
            return Err(error);
        };
        let state = RetryState::get_or_init(config);
        state.attempt_count += 1;
        let retry_count = state.attempt_count;
        let last_request_at = state.last_request_at;

        // The config stays attached so the delay and callback see the failed request.
        let delay_ms = policy.retry_delay.delay_ms(retry_count, &error);

        if let Some(config) = error.config.as_deref_mut() {
            prepare_resubmission(config, client.defaults(), &policy, last_request_at, delay_ms);
        }

        if let (Some(on_retry), Some(config)) = (&policy.on_retry, error.config.as_deref()) {
            on_retry(retry_count, &error, config);
        }

        let Some(config) = error.config.take() else {
            return Err(error);
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            method = %config.method,
            url = %config.url,
            retry = retry_count,
            max_retries = policy.max_retries,
            delay_ms,
            "retrying request after {error}"
        );

        sleep(Duration::from_millis(delay_ms)).await;
        client.request(*config).await
    }
}

fn prepare_resubmission(
    config: &mut RequestConfig,
    defaults: &ClientOptions,
    policy: &RetryPolicy,
    last_request_at: Option<Instant>,
    delay_ms: u64,
) {
    strip_default_agents(config, defaults);

    if !policy.reset_timeout_on_retry {
        if let (Some(timeout_ms), Some(last_request_at)) =
            (config.effective_timeout_ms(), last_request_at)
        {
            config.timeout_ms = Some(remaining_timeout_ms(
                timeout_ms,
                elapsed_ms(last_request_at),
                delay_ms,
            ));
        }
    }

    // The body was transformed on the first attempt; send it as-is.
    config.transform_request = Some(Vec::new());
}

/// Drops agents that are the client's own defaults; the client merges them
/// back in when the config is re-issued.
fn strip_default_agents(config: &mut RequestConfig, defaults: &ClientOptions) {
    if is_same_agent(config.http_agent.as_ref(), defaults.http_agent.as_ref()) {
        config.http_agent = None;
    }
    if is_same_agent(config.https_agent.as_ref(), defaults.https_agent.as_ref()) {
        config.https_agent = None;
    }
}

fn is_same_agent(agent: Option<&crate::Agent>, default: Option<&crate::Agent>) -> bool {
    matches!((agent, default), (Some(agent), Some(default)) if agent.ptr_eq(default))
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(Instant::now().saturating_duration_since(since).as_millis()).unwrap_or(u64::MAX)
}

/// Timeout left for the next attempt, never below 1ms since 0 disables it.
fn remaining_timeout_ms(timeout_ms: u64, elapsed_ms: u64, delay_ms: u64) -> u64 {
    timeout_ms
        .saturating_sub(elapsed_ms)
        .saturating_sub(delay_ms)
        .max(1)
}
