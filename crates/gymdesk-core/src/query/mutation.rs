//! Write handle: loading/error/data state around a non-idempotent call.
//!
//! Unlike [`ApiQuery`](super::ApiQuery) there is no cache and no dedup;
//! every `mutate` call hits the backend, and concurrent calls run
//! independently. `loading` stays set while any call is outstanding.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;

use crate::api::ApiError;

use super::use_api::{ErrorCallback, SuccessCallback};
use super::FetchState;

type Mutator<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

pub struct MutationOptions<T> {
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback>,
}

impl<T> Default for MutationOptions<T> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
        }
    }
}

impl<T> MutationOptions<T> {
    pub fn on_success(mut self, callback: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&ApiError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

struct MutationState<T> {
    view: FetchState<T>,
    pending: usize,
}

struct MutationInner<A, T> {
    mutator: Mutator<A, T>,
    options: MutationOptions<T>,
    state: watch::Sender<FetchState<T>>,
    pending: std::sync::Mutex<usize>,
}

/// Handle to one remote write. Clones share state.
pub struct ApiMutation<A, T> {
    inner: Arc<MutationInner<A, T>>,
}

impl<A, T> Clone for ApiMutation<A, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T> ApiMutation<A, T>
where
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(mutator: F, options: MutationOptions<T>) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let (state, _) = watch::channel(FetchState::default());
        Self {
            inner: Arc::new(MutationInner {
                mutator: Arc::new(move |args| mutator(args).boxed()),
                options,
                state,
                pending: std::sync::Mutex::new(0),
            }),
        }
    }

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

    /// Clear data, error and loading.
    pub fn reset(&self) {
        self.inner.state.send_replace(FetchState::default());
    }

    /// Run the mutation. The error is both recorded in state and returned.
    ///
    /// Dropping the returned future before it settles still releases its
    /// share of `loading`; data and error are left as they were.
    pub async fn mutate(&self, args: A) -> Result<T, ApiError> {
        self.update(|state| {
            state.pending += 1;
            state.view.loading = true;
            state.view.error = None;
        });
        let mut guard = PendingGuard {
            mutation: self,
            armed: true,
        };

        let result = (self.inner.mutator)(args).await;
        guard.armed = false;

        match &result {
            Ok(value) => {
                self.update(|state| {
                    state.pending -= 1;
                    state.view.loading = state.pending > 0;
                    state.view.data = Some(value.clone());
                    state.view.error = None;
                });
                if let Some(ref on_success) = self.inner.options.on_success {
                    on_success(value);
                }
            }
            Err(err) => {
                let message = err.to_string();
                self.update(|state| {
                    state.pending -= 1;
                    state.view.loading = state.pending > 0;
                    state.view.error = Some(message);
                });
                if let Some(ref on_error) = self.inner.options.on_error {
                    on_error(err);
                }
            }
        }
        result
    }

    /// Mutate the published state together with the outstanding-call count.
    fn update(&self, change: impl FnOnce(&mut MutationState<T>)) {
        let pending = &self.inner.pending;
        self.inner.state.send_modify(|view| {
            let mut count = pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let mut state = MutationState {
                view: std::mem::take(view),
                pending: *count,
            };
            change(&mut state);
            *count = state.pending;
            *view = state.view;
        });
    }
}

/// Releases an abandoned call's pending slot.
struct PendingGuard<'a, A, T> {
    mutation: &'a ApiMutation<A, T>,
    armed: bool,
}

impl<A, T> Drop for PendingGuard<'_, A, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let pending = &self.mutation.inner.pending;
        self.mutation.inner.state.send_modify(|view| {
            let mut count = pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *count = count.saturating_sub(1);
            view.loading = *count > 0;
        });
    }
}
