//! Bounded in-memory TTL cache.
//!
//! Entries are kept in insertion order; when the cache is full the oldest
//! insertion is evicted. Expired entries are dropped lazily on read and in
//! bulk by [`TtlCache::sweep_expired`].

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.age(now) > self.ttl
    }

    /// Past `stale_ratio * ttl` but not yet expired
    pub fn is_stale(&self, now: Instant, stale_ratio: f64) -> bool {
        let age = self.age(now);
        age > self.ttl.mul_f64(stale_ratio) && age <= self.ttl
    }
}

/// A cache hit
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup<T> {
    pub data: T,
    pub is_stale: bool,
    pub age: Duration,
}

#[derive(Debug)]
pub struct TtlCache<T> {
    entries: Mutex<IndexMap<String, CacheEntry<T>>>,
    max_entries: usize,
    stale_ratio: f64,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(max_entries: usize, stale_ratio: f64) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            max_entries: max_entries.max(1),
            stale_ratio: if stale_ratio.is_finite() {
                stale_ratio.clamp(0.0, 1.0)
            } else {
                1.0
            },
        }
    }

    pub fn insert(&self, key: impl Into<String>, data: T, ttl: Duration) {
        let key = key.into();
        let mut entries = self.entries.lock();
        // Re-inserting moves the key to the back of the eviction order
        entries.shift_remove(&key);
        while entries.len() >= self.max_entries {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                trace!(key = %evicted, "Evicted oldest cache entry");
            }
        }
        entries.insert(
            key,
            CacheEntry {
                data,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<CacheLookup<T>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let entry = entries.get(key)?;
        if entry.is_expired(now) {
            entries.shift_remove(key);
            trace!(key = %key, "Evicted expired cache entry on read");
            return None;
        }
        Some(CacheLookup {
            data: entry.data.clone(),
            is_stale: entry.is_stale(now, self.stale_ratio),
            age: entry.age(now),
        })
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.lock().shift_remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Drop every expired entry; returns how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fresh_then_stale_then_expired() {
        let cache = TtlCache::new(10, 0.8);
        cache.insert("prices", 42u32, Duration::from_secs(10));

        let hit = cache.get("prices").unwrap();
        assert_eq!(hit.data, 42);
        assert!(!hit.is_stale);

        tokio::time::advance(Duration::from_millis(8500)).await;
        assert!(cache.get("prices").unwrap().is_stale);

        tokio::time::advance(Duration::from_millis(1600)).await;
        assert!(cache.get("prices").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_oldest_insertion_evicted_at_capacity() {
        let cache = TtlCache::new(2, 0.8);
        cache.insert("a", 1, Duration::from_secs(60));
        cache.insert("b", 2, Duration::from_secs(60));
        cache.insert("c", 3, Duration::from_secs(60));

        assert!(cache.get("a").is_none());
        assert_eq!(cache.keys(), vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinsert_refreshes_order() {
        let cache = TtlCache::new(2, 0.8);
        cache.insert("a", 1, Duration::from_secs(60));
        cache.insert("b", 2, Duration::from_secs(60));
        cache.insert("a", 10, Duration::from_secs(60));
        cache.insert("c", 3, Duration::from_secs(60));

        assert_eq!(cache.get("a").unwrap().data, 10);
        assert!(cache.get("b").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cache = TtlCache::new(10, 0.8);
        cache.insert("short", 1, Duration::from_secs(1));
        cache.insert("long", 2, Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.invalidate("long"));
        assert!(!cache.invalidate("long"));
    }
}
