//! Request deduplication for concurrent reads.
//!
//! [`InFlight`] maps a cache key to the shared future of the request
//! currently fetching it. Concurrent callers asking for the same key await
//! the same future, so the backend sees one call.
//!
//! The underlying request runs in its own tokio task. Dropping or aborting
//! any single waiter (including the one that started it) never strands the
//! others, and the registry entry is removed when the task finishes,
//! whether it succeeded or failed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::api::ApiError;

pub type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, ApiError>>>;

/// Whether a caller started the request or joined one already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

struct Slot<V> {
    id: u64,
    fetch: SharedFetch<V>,
}

struct Registry<V> {
    slots: HashMap<String, Slot<V>>,
    next_id: u64,
}

pub struct InFlight<V> {
    registry: Arc<Mutex<Registry<V>>>,
}

impl<V> Clone for InFlight<V> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

fn lock<V>(registry: &Mutex<Registry<V>>) -> MutexGuard<'_, Registry<V>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<V> InFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                slots: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Join the request in flight for `key`, or spawn `start()` as a new one.
    ///
    /// Must be called from within a tokio runtime. `start` runs while the
    /// registry is locked, so it should only build the future.
    pub fn join_or_start<F, Fut>(&self, key: &str, start: F) -> (SharedFetch<V>, Role)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        let mut registry = lock(&self.registry);
        if let Some(slot) = registry.slots.get(key) {
            return (slot.fetch.clone(), Role::Follower);
        }

        registry.next_id += 1;
        let id = registry.next_id;
        let future = start();
        let weak: Weak<Mutex<Registry<V>>> = Arc::downgrade(&self.registry);
        let slot_key = key.to_string();

        // The task blocks on the registry lock until this slot is inserted.
        let task = tokio::spawn(async move {
            let result = future.await;
            if let Some(registry) = weak.upgrade() {
                let mut registry = lock(&registry);
                if registry.slots.get(&slot_key).map(|slot| slot.id) == Some(id) {
                    registry.slots.remove(&slot_key);
                }
            }
            result
        });

        let fetch = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(ApiError::Internal(format!("Request task failed: {}", e))),
            }
        }
        .boxed()
        .shared();

        registry.slots.insert(
            key.to_string(),
            Slot {
                id,
                fetch: fetch.clone(),
            },
        );
        (fetch, Role::Leader)
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.registry).slots.contains_key(key)
    }

    /// Returns the number of requests currently in flight.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.registry).slots.len()
    }
}

impl<V> Default for InFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_single_call() {
        let in_flight: InFlight<i32> = InFlight::new();

        let (fetch, role) = in_flight.join_or_start("key", || async { Ok(42) });
        assert_eq!(role, Role::Leader);
        assert_eq!(fetch.await, Ok(42));
        tokio::task::yield_now().await;
        assert_eq!(in_flight.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_same_key_deduplicates() {
        let in_flight: InFlight<i32> = InFlight::new();
        let call_count = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];
        for _ in 0..5 {
            let call_count = Arc::clone(&call_count);
            let (fetch, _) = in_flight.join_or_start("same-key", move || async move {
                call_count.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(50)).await;
                Ok(42)
            });
            handles.push(tokio::spawn(fetch));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }

        // The underlying function should only have been called once
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(in_flight.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_not_deduplicated() {
        let in_flight: InFlight<i32> = InFlight::new();
        let call_count = Arc::new(AtomicU32::new(0));

        let mut fetches = vec![];
        for i in 0..5 {
            let call_count = Arc::clone(&call_count);
            let (fetch, role) = in_flight.join_or_start(&format!("key-{}", i), move || async move {
                call_count.fetch_add(1, Ordering::SeqCst);
                Ok(i)
            });
            assert_eq!(role, Role::Leader);
            fetches.push(fetch);
        }

        for (i, fetch) in fetches.into_iter().enumerate() {
            assert_eq!(fetch.await, Ok(i as i32));
        }
        assert_eq!(call_count.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_entry_removed_after_failure() {
        let in_flight: InFlight<i32> = InFlight::new();

        let (first, _) = in_flight.join_or_start("key", || async {
            Err(ApiError::ServerError("boom".to_string()))
        });
        let (second, role) = in_flight.join_or_start("key", || async { Ok(1) });
        assert_eq!(role, Role::Follower);

        let expected = Err(ApiError::ServerError("boom".to_string()));
        assert_eq!(first.await, expected);
        assert_eq!(second.await, expected);

        // A call after completion starts fresh
        let (third, role) = in_flight.join_or_start("key", || async { Ok(2) });
        assert_eq!(role, Role::Leader);
        assert_eq!(third.await, Ok(2));
    }

    #[tokio::test]
    async fn test_dropping_leader_does_not_strand_followers() {
        let in_flight: InFlight<i32> = InFlight::new();

        let (leader, _) = in_flight.join_or_start("key", || async {
            sleep(Duration::from_millis(20)).await;
            Ok(7)
        });
        let (follower, role) = in_flight.join_or_start("key", || async { Ok(0) });
        assert_eq!(role, Role::Follower);

        drop(leader);
        assert_eq!(follower.await, Ok(7));
    }

    #[tokio::test]
    async fn test_in_flight_count() {
        let in_flight: InFlight<i32> = InFlight::new();
        assert_eq!(in_flight.in_flight_count(), 0);

        let (fetch, _) = in_flight.join_or_start("key", || async {
            sleep(Duration::from_millis(100)).await;
            Ok(42)
        });
        assert!(in_flight.contains("key"));
        assert_eq!(in_flight.in_flight_count(), 1);

        fetch.await.unwrap();
        assert_eq!(in_flight.in_flight_count(), 0);
    }
}
