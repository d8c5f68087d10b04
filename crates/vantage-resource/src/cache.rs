//! TTL response cache with in-flight request deduplication.
//!
//! Two maps share one lock: settled values with an expiry instant, and
//! pending requests as shared futures. A request is spawned exactly once per
//! key; every concurrent caller awaits a clone of the same shared future, so
//! they all see one outcome. The spawned task writes the cache entry before
//! it leaves the in-flight map, which means a caller that misses the
//! in-flight request always finds the cached value instead.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::errors::{ResourceError, Result};

/// Pending request that any number of callers may await.
pub type InFlight<V> = Shared<BoxFuture<'static, Result<V>>>;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct Pending<V> {
    id: u64,
    future: InFlight<V>,
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    in_flight: HashMap<String, Pending<V>>,
    next_id: u64,
}

impl<V> Inner<V> {
    /// Insert an entry, dropping every expired one first so keys that are
    /// never looked up again do not accumulate.
    fn store(&mut self, key: String, value: V, ttl: Duration) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        let pruned = before - self.entries.len();
        if pruned > 0 {
            trace!(pruned, "pruned expired entries");
        }
        let entry = Entry {
            value,
            expires_at: now + ttl,
        };
        let _ = self.entries.insert(key, entry);
    }
}

/// Keyed TTL cache plus a registry of pending requests.
///
/// Cheap to clone; clones share state.
pub struct RequestCache<V> {
    inner: Arc<Mutex<Inner<V>>>,
    ttl: Duration,
}

impl<V> Clone for RequestCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            ttl: self.ttl,
        }
    }
}

impl<V> RequestCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Empty cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                next_id: 0,
            })),
            ttl,
        }
    }

    /// Cached value for `key` if it has not expired. Expired entries are
    /// evicted.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            let _ = inner.entries.remove(key);
            trace!(key, "evicted expired entry");
        }
        None
    }

    /// Store `value` under `key`, replacing any previous entry.
    #[cfg(test)]
    pub(crate) fn insert(&self, key: impl Into<String>, value: V) {
        self.inner.lock().store(key.into(), value, self.ttl);
    }

    /// Drop the entry for `key`. Returns whether one existed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }

    /// Drop every entry and forget pending requests.
    ///
    /// Requests already running still complete for their callers, but no
    /// longer populate the cache.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.in_flight.clear();
    }

    /// Keys of live entries, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let inner = self.inner.lock();
        let mut keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| now < entry.expires_at)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of stored entries, expired or not.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[cfg(test)]
    pub(crate) fn in_flight_len(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    /// Join the pending request for `key`, or spawn `request` as the new
    /// one. Returns the shared future and whether this call started it.
    ///
    /// When `store` is set a successful result is cached under `key`.
    pub fn join_or_start<F>(&self, key: &str, store: bool, request: F) -> (InFlight<V>, bool)
    where
        F: Future<Output = Result<V>> + Send + 'static,
    {
        let mut inner = self.inner.lock();
        if let Some(pending) = inner.in_flight.get(key) {
            return (pending.future.clone(), false);
        }

        let id = inner.next_id;
        inner.next_id += 1;

        let cache = self.clone();
        let owned_key = key.to_owned();
        let task = tokio::spawn(async move {
            let result = request.await;
            cache.settle(&owned_key, id, store, &result);
            result
        });
        let future = async move {
            task.await
                .unwrap_or_else(|e| Err(ResourceError::Network(format!("request task failed: {e}"))))
        }
        .boxed()
        .shared();

        let _ = inner.in_flight.insert(
            key.to_owned(),
            Pending {
                id,
                future: future.clone(),
            },
        );
        (future, true)
    }

    fn settle(&self, key: &str, id: u64, store: bool, result: &Result<V>) {
        let mut inner = self.inner.lock();
        // A clear() or a newer request owns the key now.
        if inner.in_flight.get(key).is_none_or(|p| p.id != id) {
            return;
        }
        if store {
            if let Ok(value) = result {
                inner.store(key.to_owned(), value.clone(), self.ttl);
            }
        }
        let _ = inner.in_flight.remove(key);
    }
}

impl<V> std::fmt::Debug for RequestCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("RequestCache")
            .field("ttl", &self.ttl)
            .field("entries", &inner.entries.len())
            .field("in_flight", &inner.in_flight.len())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
