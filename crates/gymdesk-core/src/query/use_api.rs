//! Read handle with loading/error state, caching, dedup and cancellation.
//!
//! An [`ApiQuery`] is what a screen holds for one piece of remote data. Its
//! lifecycle mirrors a component effect:
//! - [`ApiQuery::mount`] runs the effect for the initial arguments
//! - [`ApiQuery::set_deps`] re-runs it when the arguments change, aborting
//!   whatever the previous run started
//! - [`ApiQuery::unmount`] aborts the current run
//!
//! Each run is an epoch. Results are applied to state only while their
//! epoch is current; the epoch check and the state write happen under the
//! same lock as the abort, so a result that loses the race against an abort
//! is dropped.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::ApiError;

use super::{FetchState, QueryClient, DEFAULT_CACHE_TTL};

pub type SuccessCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&ApiError) + Send + Sync>;

type Fetcher<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

pub struct QueryOptions<T> {
    /// Namespace of the cache key; the serialized arguments are appended.
    pub cache_key: String,
    /// Fetch when mounted and whenever the dependencies change.
    pub immediate: bool,
    pub cache_ttl: Duration,
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback>,
}

impl<T> Clone for QueryOptions<T> {
    fn clone(&self) -> Self {
        Self {
            cache_key: self.cache_key.clone(),
            immediate: self.immediate,
            cache_ttl: self.cache_ttl,
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<T> QueryOptions<T> {
    pub fn new(cache_key: impl Into<String>) -> Self {
        Self {
            cache_key: cache_key.into(),
            immediate: true,
            cache_ttl: DEFAULT_CACHE_TTL,
            on_success: None,
            on_error: None,
        }
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn on_success(mut self, callback: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&ApiError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

struct QueryInner<A, T> {
    client: QueryClient,
    fetcher: Fetcher<A, T>,
    options: QueryOptions<T>,
    state: watch::Sender<FetchState<T>>,
    /// Bumped on every abort; in-progress calls compare against it.
    epoch: watch::Sender<u64>,
    deps: Mutex<Option<String>>,
    effect: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one remote read. Clones share state.
pub struct ApiQuery<A, T> {
    inner: Arc<QueryInner<A, T>>,
}

impl<A, T> Clone for ApiQuery<A, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves once `epoch` is no longer the current one.
async fn aborted(mut epochs: watch::Receiver<u64>, epoch: u64) {
    loop {
        let current = *epochs.borrow_and_update();
        if current != epoch {
            return;
        }
        if epochs.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl<A, T> ApiQuery<A, T>
where
    A: Serialize + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(client: QueryClient, fetcher: F, options: QueryOptions<T>) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let (state, _) = watch::channel(FetchState::default());
        let (epoch, _) = watch::channel(0);
        Self {
            inner: Arc::new(QueryInner {
                client,
                fetcher: Arc::new(move |args| fetcher(args).boxed()),
                options,
                state,
                epoch,
                deps: Mutex::new(None),
                effect: Mutex::new(None),
            }),
        }
    }

    // ===== State =====

    pub fn subscribe(&self) -> watch::Receiver<FetchState<T>> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> FetchState<T> {
        self.inner.state.borrow().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.inner.state.borrow().data.clone()
    }

    pub fn loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.borrow().error.clone()
    }

    pub fn reset(&self) {
        self.inner.state.send_replace(FetchState::default());
    }

    /// Effective cache key: the configured key plus the JSON form of `args`.
    pub fn cache_key_for(&self, args: &A) -> Result<String, ApiError> {
        let args = serde_json::to_string(args)
            .map_err(|e| ApiError::InvalidRequest(format!("Arguments not serializable: {}", e)))?;
        Ok(format!("{}:{}", self.inner.options.cache_key, args))
    }

    // ===== Lifecycle =====

    pub fn mount(&self, args: A) {
        self.run_effect(args);
    }

    /// Re-run the effect if `args` differ from the last run.
    /// Returns whether a new run started.
    pub fn set_deps(&self, args: A) -> bool {
        let deps = serde_json::to_string(&args).ok();
        if deps.is_some() && *lock(&self.inner.deps) == deps {
            return false;
        }
        self.run_effect(args);
        true
    }

    pub fn unmount(&self) {
        self.abort();
    }

    /// Abort whatever the current epoch started. State is left untouched.
    pub fn abort(&self) {
        let epoch = &self.inner.epoch;
        self.inner.state.send_if_modified(|_| {
            epoch.send_modify(|e| *e += 1);
            false
        });
        if let Some(effect) = lock(&self.inner.effect).take() {
            effect.abort();
        }
    }

    fn run_effect(&self, args: A) {
        self.abort();
        *lock(&self.inner.deps) = serde_json::to_string(&args).ok();

        let immediate = self.inner.options.immediate;
        self.inner.state.send_replace(if immediate {
            FetchState::loading()
        } else {
            FetchState::default()
        });
        if !immediate {
            return;
        }

        let epoch = *self.inner.epoch.borrow();
        let this = self.clone();
        let effect = tokio::spawn(async move {
            // Failures are already recorded in state.
            let _ = this.fetch_in_epoch(args, epoch).await;
        });
        *lock(&self.inner.effect) = Some(effect);
    }

    // ===== Fetching =====

    /// Fetch for `args`, serving from cache and joining identical in-flight
    /// requests. `Ok(None)` means the call was aborted before it settled.
    pub async fn fetch_data(&self, args: A) -> Result<Option<T>, ApiError> {
        let epoch = *self.inner.epoch.borrow();
        self.fetch_in_epoch(args, epoch).await
    }

    /// Drop the cached entry for `args`, then fetch.
    pub async fn refetch(&self, args: A) -> Result<Option<T>, ApiError> {
        let key = self.cache_key_for(&args)?;
        self.inner.client.invalidate(&key);
        self.fetch_data(args).await
    }

    async fn fetch_in_epoch(&self, args: A, epoch: u64) -> Result<Option<T>, ApiError> {
        let key = match self.cache_key_for(&args) {
            Ok(key) => key,
            Err(err) => return self.settle_error(epoch, err),
        };

        if let Some(value) = self.inner.client.cached::<T>(&key) {
            return Ok(self.settle_success(epoch, value));
        }

        self.apply(epoch, |state| {
            state.loading = true;
            state.error = None;
        });

        let fetcher = Arc::clone(&self.inner.fetcher);
        let pending = self
            .inner
            .client
            .start_or_join(&key, self.inner.options.cache_ttl, move || fetcher(args));

        let outcome = tokio::select! {
            result = pending => result,
            _ = aborted(self.inner.epoch.subscribe(), epoch) => {
                debug!(key = %key, "Request aborted");
                return Ok(None);
            }
        };

        match outcome {
            Ok(value) => Ok(self.settle_success(epoch, value)),
            Err(err) => self.settle_error(epoch, err),
        }
    }

    /// Apply `update` if `epoch` is still current.
    fn apply(&self, epoch: u64, update: impl FnOnce(&mut FetchState<T>)) -> bool {
        let epochs = &self.inner.epoch;
        self.inner.state.send_if_modified(|state| {
            if *epochs.borrow() != epoch {
                return false;
            }
            update(state);
            true
        })
    }

    fn settle_success(&self, epoch: u64, value: T) -> Option<T> {
        let applied = self.apply(epoch, |state| {
            state.data = Some(value.clone());
            state.loading = false;
            state.error = None;
        });
        if !applied {
            return None;
        }
        if let Some(ref on_success) = self.inner.options.on_success {
            on_success(&value);
        }
        Some(value)
    }

    fn settle_error(&self, epoch: u64, err: ApiError) -> Result<Option<T>, ApiError> {
        let message = err.to_string();
        let applied = self.apply(epoch, |state| {
            state.loading = false;
            state.error = Some(message);
        });
        if !applied {
            return Ok(None);
        }
        if let Some(ref on_error) = self.inner.options.on_error {
            on_error(&err);
        }
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::sleep;

    fn counting_query(
        client: &QueryClient,
        calls: &Arc<AtomicU32>,
        delay: Duration,
    ) -> ApiQuery<u32, Vec<String>> {
        let calls = Arc::clone(calls);
        ApiQuery::new(
            client.clone(),
            move |page: u32| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    sleep(delay).await;
                    Ok(vec![format!("member-{}", page)])
                }
            },
            QueryOptions::new("members").immediate(false),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_share_one_call() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicU32::new(0));
        let query = counting_query(&client, &calls, Duration::from_millis(50));

        let (a, b) = tokio::join!(query.fetch_data(1), query.fetch_data(1));
        assert_eq!(a.unwrap(), Some(vec!["member-1".to_string()]));
        assert_eq!(b.unwrap(), Some(vec!["member-1".to_string()]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(query.data(), Some(vec!["member-1".to_string()]));
        assert!(!query.loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_handles_same_key_share_one_call() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicU32::new(0));
        let first = counting_query(&client, &calls, Duration::from_millis(50));
        let second = counting_query(&client, &calls, Duration::from_millis(50));

        let (a, b) = tokio::join!(first.fetch_data(1), second.fetch_data(1));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.data(), second.data());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_skips_fetch_but_reports_success() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicU32::new(0));
        let successes = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let seen = Arc::clone(&successes);
        let query: ApiQuery<u32, u32> = ApiQuery::new(
            client,
            move |page: u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(page * 10) }
            },
            QueryOptions::new("stats")
                .immediate(false)
                .on_success(move |_: &u32| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
        );

        assert_eq!(query.fetch_data(2).await.unwrap(), Some(20));
        assert_eq!(query.fetch_data(2).await.unwrap(), Some(20));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(successes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_bypasses_cache() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicU32::new(0));
        let query = counting_query(&client, &calls, Duration::from_millis(1));

        query.fetch_data(1).await.unwrap();
        query.fetch_data(1).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        query.refetch(1).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expires_after_ttl() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let query: ApiQuery<(), u32> = ApiQuery::new(
            client,
            move |_: ()| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(1) }
            },
            QueryOptions::new("dashboard")
                .immediate(false)
                .cache_ttl(Duration::from_secs(60)),
        );

        query.fetch_data(()).await.unwrap();
        sleep(Duration::from_secs(59)).await;
        query.fetch_data(()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        sleep(Duration::from_secs(2)).await;
        query.fetch_data(()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependency_change_discards_first_result() {
        let client = QueryClient::new();
        let successes = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&successes);

        let query: ApiQuery<u32, String> = ApiQuery::new(
            client,
            |page: u32| async move {
                // The first page is slow, the second fast.
                let delay = if page == 1 { 200 } else { 10 };
                sleep(Duration::from_millis(delay)).await;
                Ok(format!("page-{}", page))
            },
            QueryOptions::new("members").on_success(move |value: &String| {
                seen.lock().unwrap().push(value.clone());
            }),
        );

        query.mount(1);
        assert!(query.loading());
        sleep(Duration::from_millis(50)).await;

        assert!(query.set_deps(2));
        assert!(!query.set_deps(2));

        let mut states = query.subscribe();
        let settled = states.wait_for(|s| s.is_settled()).await.unwrap().clone();
        assert_eq!(settled.data.as_deref(), Some("page-2"));

        // Let the slow first request finish; it must not land.
        sleep(Duration::from_millis(300)).await;
        assert_eq!(query.data().as_deref(), Some("page-2"));
        assert_eq!(*successes.lock().unwrap(), vec!["page-2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_aborts_without_error() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicU32::new(0));
        let query = counting_query(&client, &calls, Duration::from_millis(100));

        let pending = {
            let query = query.clone();
            tokio::spawn(async move { query.fetch_data(3).await })
        };
        sleep(Duration::from_millis(10)).await;
        query.unmount();

        assert_eq!(pending.await.unwrap(), Ok(None));
        assert_eq!(query.error(), None);
        assert_eq!(query.data(), None);

        // The shared request still completes and fills the cache.
        sleep(Duration::from_millis(200)).await;
        assert_eq!(
            client.cached::<Vec<String>>("members:3"),
            Some(vec!["member-3".to_string()])
        );
    }

    #[tokio::test]
    async fn test_error_sets_message_and_rethrows() {
        let errors = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&errors);
        let query: ApiQuery<(), u32> = ApiQuery::new(
            QueryClient::new(),
            |_: ()| async { Err(ApiError::Validation("Plan is inactive".to_string())) },
            QueryOptions::new("plans").immediate(false).on_error(move |_: &ApiError| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let result = query.fetch_data(()).await;
        assert_eq!(result, Err(ApiError::Validation("Plan is inactive".to_string())));
        assert_eq!(query.error().as_deref(), Some("Plan is inactive"));
        assert!(!query.loading());
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        query.reset();
        assert_eq!(query.state(), FetchState::default());
    }

    #[tokio::test]
    async fn test_not_immediate_mount_stays_idle() {
        let calls = Arc::new(AtomicU32::new(0));
        let query = counting_query(&QueryClient::new(), &calls, Duration::from_millis(1));
        query.mount(1);
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!query.loading());
    }
}
