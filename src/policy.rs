use std::{fmt, sync::Arc};

use serde::Deserialize;

use crate::{
    is_network_or_idempotent_request_error, ExponentialDelay, NoDelay, RequestConfig,
    RequestError, RetryCondition, RetryDelay,
};

/// Maximum retries when neither the client nor the request sets one.
pub const DEFAULT_RETRIES: u32 = 3;

/// Callback invoked right before a retry is scheduled.
pub type OnRetry = Arc<dyn Fn(u32, &RequestError, &RequestConfig) + Send + Sync>;

/// Retry options, used both client-wide and as a per-request override.
///
/// Every field is optional; unset fields fall through to the next layer and
/// finally to the documented default.
#[derive(Clone, Default)]
pub struct RetryOptions {
    /// Maximum number of retries after the initial attempt (default `3`).
    pub retries: Option<u32>,
    /// Decides if a failure is retryable
    /// (default [`is_network_or_idempotent_request_error`]).
    pub retry_condition: Option<Arc<dyn RetryCondition>>,
    /// Wait before each retry (default [`NoDelay`]).
    pub retry_delay: Option<Arc<dyn RetryDelay>>,
    /// Give every retry the full timeout instead of the remaining budget
    /// (default `false`).
    pub should_reset_timeout: Option<bool>,
    /// Notified with `(retry_count, error, config)` before each retry.
    pub on_retry: Option<OnRetry>,
}

impl RetryOptions {
    /// Creates options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of retries.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Sets the retry condition.
    pub fn retry_condition(mut self, condition: impl RetryCondition + 'static) -> Self {
        self.retry_condition = Some(Arc::new(condition));
        self
    }

    /// Sets the delay strategy.
    pub fn retry_delay(mut self, delay: impl RetryDelay + 'static) -> Self {
        self.retry_delay = Some(Arc::new(delay));
        self
    }

    /// Sets whether each retry gets a fresh timeout.
    pub fn should_reset_timeout(mut self, reset: bool) -> Self {
        self.should_reset_timeout = Some(reset);
        self
    }

    /// Sets the callback run before each retry.
    pub fn on_retry<F>(mut self, callback: F) -> Self
    where
        F: Fn(u32, &RequestError, &RequestConfig) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("retries", &self.retries)
            .field("retry_condition", &self.retry_condition.as_ref().map(|_| ".."))
            .field("retry_delay", &self.retry_delay.as_ref().map(|_| ".."))
            .field("should_reset_timeout", &self.should_reset_timeout)
            .field("on_retry", &self.on_retry.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Effective policy for one failed request.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries.
    pub max_retries: u32,
    /// Retry eligibility predicate.
    pub retry_condition: Arc<dyn RetryCondition>,
    /// Delay strategy.
    pub retry_delay: Arc<dyn RetryDelay>,
    /// Whether retries ignore the time already spent.
    pub reset_timeout_on_retry: bool,
    /// Pre-retry callback.
    pub on_retry: Option<OnRetry>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RETRIES,
            retry_condition: Arc::new(is_network_or_idempotent_request_error),
            retry_delay: Arc::new(NoDelay),
            reset_timeout_on_retry: false,
            on_retry: None,
        }
    }
}

impl RetryPolicy {
    /// Resolves the effective policy field by field: `request` wins over
    /// `global`, which wins over the defaults.
    pub fn resolve(global: &RetryOptions, request: Option<&RetryOptions>) -> Self {
        let mut policy = Self::default();
        policy.apply(global);
        if let Some(request) = request {
            policy.apply(request);
        }
        policy
    }

    fn apply(&mut self, options: &RetryOptions) {
        if let Some(retries) = options.retries {
            self.max_retries = retries;
        }
        if let Some(condition) = &options.retry_condition {
            self.retry_condition = Arc::clone(condition);
        }
        if let Some(delay) = &options.retry_delay {
            self.retry_delay = Arc::clone(delay);
        }
        if let Some(reset) = options.should_reset_timeout {
            self.reset_timeout_on_retry = reset;
        }
        if let Some(on_retry) = &options.on_retry {
            self.on_retry = Some(Arc::clone(on_retry));
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("reset_timeout_on_retry", &self.reset_timeout_on_retry)
            .field("on_retry", &self.on_retry.is_some())
            .finish_non_exhaustive()
    }
}

/// Named delay strategy usable from configuration files.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DelayKind {
    /// [`NoDelay`].
    #[default]
    None,
    /// [`ExponentialDelay`] with the default factor.
    Exponential,
}

impl std::str::FromStr for DelayKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "exponential" => Ok(Self::Exponential),
            other => Err(format!("unknown retry delay '{other}'")),
        }
    }
}

/// Data-only retry settings, loadable from JSON or the environment.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryProfile {
    /// Maximum number of retries.
    pub retries: Option<u32>,
    /// Whether each retry gets a fresh timeout.
    pub should_reset_timeout: Option<bool>,
    /// Delay strategy.
    pub delay: Option<DelayKind>,
}

impl RetryProfile {
    /// Parses a profile from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|err| format!("invalid retry profile JSON: {err}"))
    }

    /// Reads a profile from environment variables.
    ///
    /// Reads:
    /// - `RETRY_HOOKS_RETRIES`: maximum number of retries
    /// - `RETRY_HOOKS_SHOULD_RESET_TIMEOUT`: `true` or `false`
    /// - `RETRY_HOOKS_DELAY`: `none` or `exponential`
    ///
    /// Unset variables stay unset; malformed values are an error.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let retries = lookup("RETRY_HOOKS_RETRIES")
            .map(|value| {
                value
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| format!("RETRY_HOOKS_RETRIES must be an integer, got '{value}'"))
            })
            .transpose()?;
        let should_reset_timeout = lookup("RETRY_HOOKS_SHOULD_RESET_TIMEOUT")
            .map(|value| {
                value.trim().parse::<bool>().map_err(|_| {
                    format!("RETRY_HOOKS_SHOULD_RESET_TIMEOUT must be true or false, got '{value}'")
                })
            })
            .transpose()?;
        let delay = lookup("RETRY_HOOKS_DELAY")
            .map(|value| value.parse::<DelayKind>())
            .transpose()?;

        Ok(Self {
            retries,
            should_reset_timeout,
            delay,
        })
    }
}

impl From<RetryProfile> for RetryOptions {
    fn from(profile: RetryProfile) -> Self {
        let retry_delay = profile.delay.map(|kind| -> Arc<dyn RetryDelay> {
            match kind {
                DelayKind::None => Arc::new(NoDelay),
                DelayKind::Exponential => Arc::new(ExponentialDelay::default()),
            }
        });
        Self {
            retries: profile.retries,
            retry_condition: None,
            retry_delay,
            should_reset_timeout: profile.should_reset_timeout,
            on_retry: None,
        }
    }
}
