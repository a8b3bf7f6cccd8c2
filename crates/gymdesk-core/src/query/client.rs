use std::any::Any;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::cache::TtlCache;

use super::in_flight::{InFlight, Role};

/// Type-erased value shared between the response cache and in-flight requests.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

static SHARED: OnceLock<QueryClient> = OnceLock::new();

/// Response cache plus in-flight registry backing every [`ApiQuery`](super::ApiQuery).
///
/// Cheap to clone; clones share state. Tests build a fresh one per case,
/// applications usually hand the same instance (or [`QueryClient::shared`])
/// to every query.
#[derive(Clone)]
pub struct QueryClient {
    cache: TtlCache<CachedValue>,
    in_flight: InFlight<CachedValue>,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryClient {
    pub fn new() -> Self {
        Self {
            cache: TtlCache::new("queries"),
            in_flight: InFlight::new(),
        }
    }

    /// Process-wide instance.
    pub fn shared() -> Self {
        SHARED.get_or_init(QueryClient::new).clone()
    }

    /// Cached value for `key`, if live and of type `T`.
    pub fn cached<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let value = self.cache.get(key)?;
        match value.downcast_ref::<T>() {
            Some(value) => Some(value.clone()),
            None => {
                warn!(key = key, "Cached value has a different type, ignoring");
                None
            }
        }
    }

    pub fn set<T: Send + Sync + 'static>(&self, key: &str, value: T, ttl: Duration) {
        self.cache.set(key, Arc::new(value) as CachedValue, ttl);
    }

    pub fn invalidate(&self, key: &str) {
        self.cache.delete(key);
    }

    /// Drop every response cached under `resource`, i.e. keys equal to it
    /// or starting with `resource:`. Returns how many were dropped.
    pub fn invalidate_prefix(&self, resource: &str) -> usize {
        let scoped = format!("{}:", resource);
        let stale: Vec<String> = self
            .cache
            .keys()
            .into_iter()
            .filter(|key| key == resource || key.starts_with(&scoped))
            .collect();
        for key in &stale {
            self.cache.delete(key);
        }
        if !stale.is_empty() {
            debug!(resource = resource, entries = stale.len(), "Invalidated cached queries");
        }
        stale.len()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains(key)
    }

    /// Serve `key` from cache, else join or start the request for it.
    pub async fn fetch<T, F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<T, ApiError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        if let Some(value) = self.cached::<T>(key) {
            return Ok(value);
        }
        self.start_or_join(key, ttl, fetch).await
    }

    /// Join the request in flight for `key` or start one. A successful
    /// result is cached for `ttl` before the in-flight entry is released.
    pub(crate) fn start_or_join<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> BoxFuture<'static, Result<T, ApiError>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let cache = self.cache.clone();
        let cache_key = key.to_string();
        let (shared, role) = self.in_flight.join_or_start(key, move || {
            let request = fetch();
            async move {
                let value: CachedValue = Arc::new(request.await?);
                cache.set(cache_key, Arc::clone(&value), ttl);
                Ok(value)
            }
        });

        match role {
            Role::Leader => debug!(key = key, "Starting request"),
            Role::Follower => debug!(key = key, "Joining in-flight request"),
        }

        let key = key.to_string();
        async move {
            let value = shared.await?;
            value.downcast_ref::<T>().cloned().ok_or_else(|| {
                ApiError::Internal(format!("Request for {} resolved to a different type", key))
            })
        }
        .boxed()
    }
}
