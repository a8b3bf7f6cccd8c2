//! Trailing-edge debouncing for search-as-you-type.
//!
//! Each [`Debouncer::call`] restarts a quiet period; only the arguments of
//! the last call in a burst reach the action. An action that has already
//! started runs to completion regardless of later calls.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::task::JoinHandle;
use tracing::trace;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

type Action<A> = Arc<dyn Fn(A) -> BoxFuture<'static, ()> + Send + Sync>;

pub struct Debouncer<A> {
    delay: Duration,
    action: Action<A>,
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<A> Clone for Debouncer<A> {
    fn clone(&self) -> Self {
        Self {
            delay: self.delay,
            action: Arc::clone(&self.action),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<A: Send + 'static> Debouncer<A> {
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::with_delay(DEFAULT_DEBOUNCE, action)
    }

    pub fn with_delay<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            delay,
            action: Arc::new(move |args| action(args).boxed()),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule the action with `args`, replacing any pending trigger.
    /// Must be called from within a tokio runtime.
    pub fn call(&self, args: A) {
        let delay = self.delay;
        let action = Arc::clone(&self.action);

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.abort();
            trace!("Debounce restarted");
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Detached so aborting this timer cannot cut the action short.
            tokio::spawn(action(args));
        }));
    }

    /// Drop the pending trigger, if any.
    pub fn cancel(&self) {
        if let Some(previous) = self.pending.lock().unwrap_or_else(PoisonError::into_inner).take() {
            previous.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Debouncer<String>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let debouncer = Debouncer::new(move |query: String| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(query);
            }
        });
        (seen, debouncer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_triggers_once_with_last_args() {
        let (seen, debouncer) = recorder();

        for query in ["w", "wa", "wan"] {
            debouncer.call(query.to_string());
            sleep(Duration::from_millis(100)).await;
        }
        assert!(seen.lock().unwrap().is_empty());

        sleep(Duration::from_millis(250)).await;
        assert_eq!(*seen.lock().unwrap(), vec!["wan".to_string()]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_trigger_separately() {
        let (seen, debouncer) = recorder();

        debouncer.call("a".to_string());
        sleep(Duration::from_millis(400)).await;
        debouncer.call("b".to_string());
        sleep(Duration::from_millis(400)).await;

        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_trigger() {
        let (seen, debouncer) = recorder();

        debouncer.call("a".to_string());
        assert!(debouncer.is_pending());
        debouncer.cancel();
        sleep(Duration::from_secs(1)).await;

        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_action_is_not_cancelled() {
        let finished = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&finished);
        let debouncer = Debouncer::new(move |query: String| {
            let sink = Arc::clone(&sink);
            async move {
                sleep(Duration::from_millis(500)).await;
                sink.lock().unwrap().push(query);
            }
        });

        debouncer.call("first".to_string());
        sleep(Duration::from_millis(350)).await;
        // "first" is running; this only schedules another trigger
        debouncer.call("second".to_string());
        sleep(Duration::from_secs(2)).await;

        assert_eq!(
            *finished.lock().unwrap(),
            vec!["first".to_string(), "second".to_string()]
        );
    }
}
