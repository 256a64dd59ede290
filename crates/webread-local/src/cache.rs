//! In-memory bounded caches.
//!
//! Eviction is FIFO by insertion time: reads never refresh an entry's position.
//! TTL is checked on read only; stale entries stay in place until they are pushed
//! out by newer inserts.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::CacheConfig;

pub const SEARCH_RESULTS_CAPACITY: usize = 100;
pub const URL_CONTENT_CAPACITY: usize = 200;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
}

#[derive(Debug)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    ttl: Option<Duration>,
    entries: HashMap<K, CacheEntry<V>>,
    order: VecDeque<K>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// `capacity` is clamped to at least 1. `ttl = None` means entries never expire.
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_fresh(&self, e: &CacheEntry<V>) -> bool {
        match self.ttl {
            Some(ttl) => e.inserted_at.elapsed() <= ttl,
            None => true,
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let e = self.entries.get(key)?;
        self.is_fresh(e).then_some(&e.value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Insert, evicting oldest-inserted entries first while at capacity.
    /// Overwriting a key counts as a fresh insertion.
    pub fn set(&mut self, key: K, value: V) {
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        } else {
            while self.entries.len() >= self.capacity {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Keys from oldest to newest insertion.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.order.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStatus {
    pub size: usize,
    pub max_size: usize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Cross-session content tiers: search result text and converted page text.
#[derive(Debug)]
pub struct GlobalCache {
    search_results: Mutex<BoundedCache<String, String>>,
    url_content: Mutex<BoundedCache<String, String>>,
}

impl Default for GlobalCache {
    fn default() -> Self {
        Self::new(SEARCH_RESULTS_CAPACITY, URL_CONTENT_CAPACITY)
    }
}

impl GlobalCache {
    pub fn new(search_capacity: usize, url_capacity: usize) -> Self {
        Self {
            search_results: Mutex::new(BoundedCache::new(search_capacity, None)),
            url_content: Mutex::new(BoundedCache::new(url_capacity, None)),
        }
    }

    pub fn search_get(&self, normalized_query: &str) -> Option<String> {
        lock(&self.search_results)
            .get(&normalized_query.to_string())
            .cloned()
    }

    pub fn search_put(&self, normalized_query: String, results: String) {
        lock(&self.search_results).set(normalized_query, results);
    }

    pub fn url_get(&self, url: &str) -> Option<String> {
        lock(&self.url_content).get(&url.to_string()).cloned()
    }

    pub fn url_put(&self, url: String, markdown: String) {
        lock(&self.url_content).set(url, markdown);
    }

    pub fn search_status(&self) -> CacheStatus {
        let c = lock(&self.search_results);
        CacheStatus {
            size: c.len(),
            max_size: c.capacity(),
        }
    }

    pub fn url_status(&self) -> CacheStatus {
        let c = lock(&self.url_content);
        CacheStatus {
            size: c.len(),
            max_size: c.capacity(),
        }
    }
}

/// The fetch-path cache: resolved URL -> converted markdown, bounded by
/// `cache.max_size` and `cache.ttl`. Disabled caches never store anything.
#[derive(Debug)]
pub struct ContentCache {
    enabled: bool,
    inner: Mutex<BoundedCache<String, String>>,
}

impl ContentCache {
    pub fn new(cfg: &CacheConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            inner: Mutex::new(BoundedCache::new(cfg.max_size, Some(cfg.ttl))),
        }
    }

    pub fn get(&self, url: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        lock(&self.inner).get(&url.to_string()).cloned()
    }

    pub fn put(&self, url: String, markdown: String) {
        if self.enabled {
            lock(&self.inner).set(url, markdown);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self) -> CacheStatus {
        let c = lock(&self.inner);
        CacheStatus {
            size: c.len(),
            max_size: c.capacity(),
        }
    }

    pub fn clear(&self) {
        lock(&self.inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn evicts_oldest_inserted_not_least_recently_read() {
        let mut c = BoundedCache::new(2, None);
        c.set("a", 1);
        c.set("b", 2);
        // Reading "a" must not protect it.
        assert_eq!(c.get(&"a"), Some(&1));
        c.set("c", 3);
        assert_eq!(c.get(&"a"), None);
        assert_eq!(c.get(&"b"), Some(&2));
        assert_eq!(c.get(&"c"), Some(&3));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn overwrite_moves_key_to_newest() {
        let mut c = BoundedCache::new(2, None);
        c.set("a", 1);
        c.set("b", 2);
        c.set("a", 10);
        assert_eq!(c.len(), 2);
        c.set("c", 3);
        assert_eq!(c.get(&"b"), None);
        assert_eq!(c.get(&"a"), Some(&10));
    }

    #[test]
    fn expired_entries_read_as_absent_but_stay_in_order() {
        let mut c = BoundedCache::new(3, Some(Duration::from_millis(1)));
        c.set("a", 1);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(c.get(&"a"), None);
        assert!(!c.contains_key(&"a"));
        assert_eq!(c.len(), 1);
        assert_eq!(c.keys().collect::<Vec<_>>(), vec![&"a"]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut c = BoundedCache::new(0, None);
        c.set(1, 1);
        c.set(2, 2);
        assert_eq!(c.capacity(), 1);
        assert_eq!(c.len(), 1);
        assert_eq!(c.get(&2), Some(&2));
    }

    #[test]
    fn disabled_content_cache_never_stores() {
        let cfg = CacheConfig {
            enabled: false,
            ttl: Duration::from_secs(60),
            max_size: 10,
        };
        let c = ContentCache::new(&cfg);
        c.put("https://x/".to_string(), "body".to_string());
        assert!(c.get("https://x/").is_none());
        assert!(c.is_empty());
    }

    #[test]
    fn global_cache_reports_status() {
        let g = GlobalCache::default();
        g.search_put("rust".to_string(), "1. Rust".to_string());
        g.url_put("https://x/".to_string(), "# X".to_string());
        assert_eq!(
            g.search_status(),
            CacheStatus {
                size: 1,
                max_size: SEARCH_RESULTS_CAPACITY
            }
        );
        assert_eq!(g.url_status().max_size, URL_CONTENT_CAPACITY);
        assert_eq!(g.url_get("https://x/").as_deref(), Some("# X"));
    }

    proptest! {
        #[test]
        fn size_bounded_and_fifo_eviction(
            cap in 1usize..8,
            keys in prop::collection::vec(0u8..16, 0..64),
        ) {
            let mut c = BoundedCache::new(cap, None);
            // Model: insertion order with overwrite-moves-to-back.
            let mut model: Vec<u8> = Vec::new();
            for k in keys {
                if let Some(pos) = model.iter().position(|m| *m == k) {
                    model.remove(pos);
                } else if model.len() >= cap {
                    model.remove(0);
                }
                model.push(k);
                c.set(k, k);
                prop_assert!(c.len() <= cap);
                let order: Vec<u8> = c.keys().copied().collect();
                prop_assert_eq!(&order, &model);
            }
        }
    }
}
