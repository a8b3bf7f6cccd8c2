//! Expiring in-memory key/value store.
//!
//! Every entry gets its own expiry timer (a tokio task) so `has`, `keys`
//! and `len` never report an entry past its TTL. Reads also compare the
//! entry age against its TTL, which keeps behaviour identical when no tokio
//! runtime is available to host timers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: Instant,
    pub ttl: Duration,
    /// Distinguishes this write from later writes to the same key.
    stamp: u64,
}

impl<V> CacheEntry<V> {
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.stored_at)
    }

    pub fn is_live(&self) -> bool {
        self.age() < self.ttl
    }
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    timers: HashMap<String, JoinHandle<()>>,
    next_stamp: u64,
}

impl<V> Inner<V> {
    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        if let Some(timer) = self.timers.remove(key) {
            timer.abort();
        }
        self.entries.remove(key)
    }

    /// Timer callback: only evicts the write that scheduled it.
    fn expire(&mut self, key: &str, stamp: u64) -> bool {
        if self.entries.get(key).map(|e| e.stamp) == Some(stamp) {
            self.entries.remove(key);
            self.timers.remove(key);
            true
        } else {
            false
        }
    }
}

impl<V> Drop for Inner<V> {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
    }
}

/// Expiring key/value store. Clones share the same entries.
pub struct TtlCache<V> {
    name: Arc<str>,
    inner: Arc<Mutex<Inner<V>>>,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<V: Clone + Send + 'static> TtlCache<V> {
    /// `name` only shows up in logs.
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                timers: HashMap::new(),
                next_stamp: 0,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` under `key` for `ttl`, replacing any previous entry and
    /// cancelling its timer.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let mut inner = self.lock();
        inner.next_stamp += 1;
        let stamp = inner.next_stamp;

        if let Some(previous) = inner.timers.remove(&key) {
            previous.abort();
        }
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
                stamp,
            },
        );

        if let Ok(runtime) = Handle::try_current() {
            let weak = Arc::downgrade(&self.inner);
            let name = Arc::clone(&self.name);
            let timer_key = key.clone();
            let timer = runtime.spawn(async move {
                tokio::time::sleep(ttl).await;
                if let Some(inner) = weak.upgrade() {
                    let expired = inner
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .expire(&timer_key, stamp);
                    if expired {
                        trace!(cache = %name, key = %timer_key, "Cache entry expired");
                    }
                }
            });
            inner.timers.insert(key.clone(), timer);
        }
        trace!(cache = %self.name, key = %key, ttl_ms = ttl.as_millis() as u64, "Cache set");
    }

    /// Value for `key` if present and younger than its TTL.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();
        match inner.entries.get(key) {
            Some(entry) if entry.is_live() => {
                debug!(cache = %self.name, key = key, "Cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                inner.remove(key);
                debug!(cache = %self.name, key = key, "Cache entry stale");
                None
            }
            None => {
                debug!(cache = %self.name, key = key, "Cache miss");
                None
            }
        }
    }

    /// Live entry with its metadata.
    pub fn entry(&self, key: &str) -> Option<CacheEntry<V>> {
        let mut inner = self.lock();
        match inner.entries.get(key) {
            Some(entry) if entry.is_live() => Some(entry.clone()),
            Some(_) => {
                inner.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.entry(key).is_some()
    }

    /// Remove `key`; a missing key is a no-op.
    pub fn delete(&self, key: &str) {
        if self.lock().remove(key).is_some() {
            debug!(cache = %self.name, key = key, "Cache entry deleted");
        }
    }

    /// Remove every entry and cancel every timer.
    pub fn clear(&self) {
        let mut inner = self.lock();
        for (_, timer) in inner.timers.drain() {
            timer.abort();
        }
        let count = inner.entries.len();
        inner.entries.clear();
        if count > 0 {
            debug!(cache = %self.name, entries = count, "Cache cleared");
        }
    }

    /// Keys of live entries, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut inner = self.lock();
        let stale: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            inner.remove(key);
        }
        let mut keys: Vec<String> = inner.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
