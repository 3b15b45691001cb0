use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{HttpClient, HttpResponse, RequestConfig, RequestError, Result};

/// Runs before every transport attempt and may rewrite the request config.
pub trait RequestInterceptor: Send + Sync {
    /// Receives the config about to be sent and returns the one to send.
    fn on_request(&self, config: RequestConfig) -> Result<RequestConfig>;
}

/// Observes the outcome of an attempt.
///
/// Interceptors are chained: each one receives what the previous one
/// produced, so a later interceptor sees a recovered response instead of the
/// original error.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    /// Called with a successful response.
    async fn on_response(&self, response: HttpResponse) -> Result<HttpResponse> {
        Ok(response)
    }

    /// Called with a failure. `client` may be used to re-issue the request.
    async fn on_error(&self, client: &HttpClient, error: RequestError) -> Result<HttpResponse> {
        let _ = client;
        Err(error)
    }
}

/// Handle returned when registering an interceptor; used to eject it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InterceptorId(usize);

/// Ordered interceptor registry with stable ids.
pub(crate) struct Interceptors<T: ?Sized> {
    slots: RwLock<Vec<Option<Arc<T>>>>,
}

impl<T: ?Sized> Default for Interceptors<T> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> Interceptors<T> {
    pub(crate) fn register(&self, interceptor: Arc<T>) -> InterceptorId {
        let mut slots = self.slots.write();
        slots.push(Some(interceptor));
        InterceptorId(slots.len() - 1)
    }

    /// Returns `false` if `id` was unknown or already ejected.
    pub(crate) fn eject(&self, id: InterceptorId) -> bool {
        self.slots
            .write()
            .get_mut(id.0)
            .and_then(Option::take)
            .is_some()
    }

    /// Active interceptors in registration order.
    ///
    /// The lock is released before the snapshot is used, so interceptors may
    /// register or eject others while running.
    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        self.slots.read().iter().flatten().cloned().collect()
    }
}
