//! Bounded in-memory cache with LRU eviction and TTL expiry.
//!
//! All operations on one instance are serialised through a single async
//! mutex. Time is read from `tokio::time::Instant` so tests can pause and
//! advance the clock.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Observable cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Entries removed to make room for new keys.
    pub evictions: u64,
    /// Entries removed because their TTL elapsed.
    pub expirations: u64,
    pub size: usize,
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    last_access: Instant,
}

#[derive(Debug)]
struct Inner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    stats: CacheStats,
}

/// A generic key/value cache.
///
/// # Semantics
///
/// - Inserting a new key into a full cache first evicts the entry with the
///   oldest `last_access`
/// - `get` refreshes `last_access` on a hit
/// - An entry idle for longer than the TTL is a miss and is dropped on access
#[derive(Debug)]
pub struct Cache<K, V> {
    inner: Mutex<Inner<K, V>>,
    max_size: usize,
    ttl: Duration,
    name: &'static str,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `max_size` entries (minimum 1).
    #[must_use]
    pub fn new(name: &'static str, max_size: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
            max_size: max_size.max(1),
            ttl,
            name,
        }
    }

    /// Look up `key`, refreshing its access time on a hit.
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let now = Instant::now();

        match inner.entries.get_mut(key) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(entry) if now.duration_since(entry.last_access) <= self.ttl => {
                entry.last_access = now;
                let value = entry.value.clone();
                inner.stats.hits += 1;
                return Some(value);
            }
            Some(_) => {}
        }

        inner.entries.remove(key);
        inner.stats.expirations += 1;
        inner.stats.misses += 1;
        inner.stats.size = inner.entries.len();
        tracing::trace!(target: "mdimg.cache", cache = self.name, "Entry expired");
        None
    }

    /// Insert or replace `key`.
    pub async fn set(&self, key: K, value: V) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let now = Instant::now();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_size {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
                inner.stats.evictions += 1;
                tracing::trace!(target: "mdimg.cache", cache = self.name, "Evicted least recently used entry");
            }
        }

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                last_access: now,
            },
        );
        inner.stats.sets += 1;
        inner.stats.size = inner.entries.len();
    }

    /// Remove `key`. Returns true if it was present.
    ///
    /// Deleting an absent key counts as a miss.
    pub async fn delete(&self, key: &K) -> bool {
        let mut inner = self.inner.lock().await;
        let removed = inner.entries.remove(key).is_some();
        if removed {
            inner.stats.deletes += 1;
            inner.stats.size = inner.entries.len();
        } else {
            inner.stats.misses += 1;
        }
        removed
    }

    /// Drop every entry, counting each as an eviction.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        let dropped = inner.entries.len() as u64;
        inner.entries.clear();
        inner.stats.evictions += dropped;
        inner.stats.size = 0;
        if dropped > 0 {
            tracing::debug!(target: "mdimg.cache", cache = self.name, dropped, "Cache cleared");
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.lock().await.stats
    }
}
