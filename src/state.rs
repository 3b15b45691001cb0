use tokio::time::Instant;

use crate::RequestConfig;

/// Retry bookkeeping carried by one logical request.
///
/// Lives inside its [`RequestConfig`] and follows it through every attempt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
    pub(crate) attempt_count: u32,
    pub(crate) last_request_at: Option<Instant>,
}

impl RetryState {
    /// Returns the state attached to `config`, creating it on first access.
    ///
    /// An existing counter is never reset.
    pub fn get_or_init(config: &mut RequestConfig) -> &mut RetryState {
        config.retry_state.get_or_insert_with(RetryState::default)
    }

    /// Number of retries already decided for this request.
    ///
    /// The initial attempt does not count, so this is `0` until the first
    /// retry is scheduled.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// When the most recent attempt passed through the pre-request hook.
    pub fn last_request_at(&self) -> Option<Instant> {
        self.last_request_at
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;

    use super::*;

    #[test]
    fn state_is_created_lazily_with_zero_attempts() {
        let mut config = RequestConfig::new(Method::GET, "/");
        assert!(config.retry_state().is_none());

        let state = RetryState::get_or_init(&mut config);
        assert_eq!(state.attempt_count(), 0);
        assert!(state.last_request_at().is_none());
        assert!(config.retry_state().is_some());
    }

    #[test]
    fn existing_counter_survives_repeated_access() {
        let mut config = RequestConfig::new(Method::GET, "/");
        RetryState::get_or_init(&mut config).attempt_count += 2;

        assert_eq!(RetryState::get_or_init(&mut config).attempt_count(), 2);
    }

    #[test]
    fn cloned_configs_do_not_share_state() {
        let mut first = RequestConfig::new(Method::GET, "/");
        RetryState::get_or_init(&mut first);
        let mut second = first.clone();

        RetryState::get_or_init(&mut second).attempt_count += 1;

        assert_eq!(first.retry_state().map(RetryState::attempt_count), Some(0));
        assert_eq!(second.retry_state().map(RetryState::attempt_count), Some(1));
    }
}
