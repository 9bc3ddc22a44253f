//! The [LruMemoryCache] is a thread safe, weight bounded cache from string keys to shared values.
//!
//! It is a [WeightedLru] behind a single mutex.  Every operation, reads included, takes the lock for a short bounded
//! critical section: a lookup moves the entry to the front of the recency list, so even `get` mutates.  Values are
//! weighed before the lock is taken, so nothing user supplied runs while it is held.
//!
//! Keys which are blank are ignored rather than rejected.  Setting one does nothing, and looking one up finds
//! nothing.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::*;

#[derive(Debug, Clone, derive_builder::Builder)]
pub struct MemoryCacheConfig {
    /// Maximum total weight of the cache, usually in bytes.
    ///
    /// A single entry heavier than this is still cached, alone, until the next insertion pushes it out.
    pub max_weight: u64,
}

impl MemoryCacheConfig {
    /// Build a config by querying a [CapacitySource] once.
    pub fn from_capacity<S: CapacitySource + ?Sized>(
        source: &S,
    ) -> Result<MemoryCacheConfig, CapacityError> {
        Ok(MemoryCacheConfigBuilder::default()
            .max_weight(source.max_weight())
            .build()?)
    }
}

/// Whether a key should be treated as missing.
fn is_blank(key: &str) -> bool {
    key.is_empty()
}

pub struct LruMemoryCache<V, W = CostWeigher> {
    lru: Mutex<WeightedLru<str, V>>,
    weigher: W,
}

impl<V: EstimateCost> LruMemoryCache<V, CostWeigher> {
    /// A cache weighing values by their own [EstimateCost].
    pub fn with_max_weight(max_weight: u64) -> LruMemoryCache<V, CostWeigher> {
        LruMemoryCache::new(CostWeigher, MemoryCacheConfig { max_weight })
    }
}

impl<V, W: Weigher<V>> LruMemoryCache<V, W> {
    pub fn new(weigher: W, config: MemoryCacheConfig) -> LruMemoryCache<V, W> {
        debug!(max_weight = config.max_weight, "creating lru memory cache");
        LruMemoryCache {
            lru: Mutex::new(WeightedLru::new(config.max_weight)),
            weigher,
        }
    }

    /// Build a cache whose maximum weight comes from `source`, which is asked exactly once.
    pub fn from_capacity<S: CapacitySource + ?Sized>(
        weigher: W,
        source: &S,
    ) -> Result<LruMemoryCache<V, W>, CapacityError> {
        Ok(LruMemoryCache::new(
            weigher,
            MemoryCacheConfig::from_capacity(source)?,
        ))
    }

    /// Weighing happens before locking and the lru never panics part way through an update, so a poisoned lock is
    /// still usable.
    fn lock(&self) -> MutexGuard<'_, WeightedLru<str, V>> {
        self.lru.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cache a value, evicting least recently used entries if the cache is now too heavy.
    ///
    /// Returns the value previously cached under this key, if any.
    pub fn set(&self, key: &str, value: V) -> Option<Arc<V>> {
        if is_blank(key) {
            return None;
        }

        self.set_arc(key, Arc::new(value))
    }

    /// Like [LruMemoryCache::set], for values which are already shared.
    pub fn set_arc(&self, key: &str, value: Arc<V>) -> Option<Arc<V>> {
        if is_blank(key) {
            return None;
        }

        let weight = self.weigher.weigh(&*value);
        self.lock().insert_arc(Arc::from(key), value, weight)
    }

    /// Find a value, making it the most recently used entry.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        if is_blank(key) {
            return None;
        }

        self.lock().get(key)
    }

    pub fn remove(&self, key: &str) -> Option<Arc<V>> {
        if is_blank(key) {
            return None;
        }

        self.lock().remove(key)
    }

    /// Check for a key.  Unlike [LruMemoryCache::get] this does not count as a use.
    pub fn contains(&self, key: &str) -> bool {
        !is_blank(key) && self.lock().contains(key)
    }

    /// Total weight of the cached values.
    pub fn size(&self) -> u64 {
        self.lock().current_weight()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Evict everything, least recently used first.
    pub fn clear(&self) {
        let mut guard = self.lock();
        let count = guard.len();
        guard.clear();
        debug!(count, "cleared lru memory cache");
    }

    /// Evict least recently used entries until the total weight is at most `target`.
    pub fn trim_to_size(&self, target: u64) -> usize {
        self.lock().trim_to_size(target)
    }

    pub fn max_size(&self) -> u64 {
        self.lock().max_weight()
    }

    /// Change the maximum weight.  Shrinking it evicts straight away.
    pub fn set_max_size(&self, max_weight: u64) {
        let evicted = self.lock().set_max_weight(max_weight);
        debug!(max_weight, evicted, "resized lru memory cache");
    }

    /// Snapshot of the cached keys, most recently used first.
    pub fn keys(&self) -> Vec<String> {
        self.lock().iter().map(|(k, _)| k.to_string()).collect()
    }
}

impl<V, W: Weigher<V>> Cache<V> for LruMemoryCache<V, W> {
    fn set(&self, key: &str, value: V) {
        LruMemoryCache::set(self, key, value);
    }

    fn get(&self, key: &str) -> Option<Arc<V>> {
        LruMemoryCache::get(self, key)
    }

    fn remove(&self, key: &str) -> Option<Arc<V>> {
        LruMemoryCache::remove(self, key)
    }

    fn contains(&self, key: &str) -> bool {
        LruMemoryCache::contains(self, key)
    }

    fn size(&self) -> u64 {
        LruMemoryCache::size(self)
    }

    fn count(&self) -> usize {
        LruMemoryCache::count(self)
    }

    fn clear(&self) {
        LruMemoryCache::clear(self)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    /// A value of the given weight.
    fn blob(weight: usize) -> Vec<u8> {
        vec![0; weight]
    }

    fn build_cache(max_weight: u64) -> LruMemoryCache<Vec<u8>> {
        let cfg = MemoryCacheConfigBuilder::default()
            .max_weight(max_weight)
            .build()
            .expect("Should build");
        LruMemoryCache::new(CostWeigher, cfg)
    }

    #[test]
    fn basic_ops() {
        let cache = LruMemoryCache::new(
            |s: &String| s.len() as u64,
            MemoryCacheConfig { max_weight: 100 },
        );
        assert!(cache.set("a", "abc".to_string()).is_none());
        cache.set("b", "defg".to_string());

        assert_eq!(cache.get("a").as_deref().map(|x| &x[..]), Some("abc"));
        assert!(cache.contains("b"));
        assert_eq!(cache.count(), 2);
        assert_eq!(cache.size(), 7);

        assert_eq!(cache.remove("b").as_deref().map(|x| &x[..]), Some("defg"));
        assert!(!cache.contains("b"));
        assert!(cache.get("b").is_none());
        assert_eq!(cache.size(), 3);
        assert_eq!(cache.max_size(), 100);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = build_cache(100);
        cache.set("A", blob(40));
        cache.set("B", blob(40));
        cache.set("C", blob(40));

        assert!(!cache.contains("A"));
        assert_eq!(cache.keys(), vec!["C", "B"]);
        assert_eq!(cache.size(), 80);

        // Reading B makes C the oldest.
        cache.get("B").expect("B is cached");
        cache.set("D", blob(40));
        assert_eq!(cache.keys(), vec!["D", "B"]);
        assert_eq!(cache.size(), 80);
    }

    #[test]
    fn test_contains_is_not_a_use() {
        let cache = build_cache(100);
        cache.set("A", blob(40));
        cache.set("B", blob(40));

        assert!(cache.contains("A"));
        cache.set("C", blob(40));
        assert!(!cache.contains("A"));
        assert!(cache.contains("B"));
    }

    #[test]
    fn test_overwrite() {
        let cache = build_cache(100);
        cache.set("k", blob(30));
        let old = cache.set("k", blob(10)).expect("Had a previous value");

        assert_eq!(old.len(), 30);
        assert_eq!(cache.count(), 1);
        assert_eq!(cache.size(), 10);
    }

    #[test]
    fn test_blank_keys() {
        let cache = build_cache(100);
        cache.set("a", blob(5));

        assert!(cache.set("", blob(50)).is_none());
        assert!(cache.set_arc("", Arc::new(blob(50))).is_none());
        assert!(cache.get("").is_none());
        assert!(cache.remove("").is_none());
        assert!(!cache.contains(""));

        assert_eq!(cache.count(), 1);
        assert_eq!(cache.size(), 5);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let cache = build_cache(100);
        assert!(cache.remove("nope").is_none());

        cache.set("a", blob(5));
        cache.remove("a");
        assert!(cache.remove("a").is_none());
        assert_eq!(cache.size(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_oversized_value() {
        let cache = build_cache(100);
        cache.set("a", blob(10));
        cache.set("b", blob(10));
        cache.set("huge", blob(150));

        assert_eq!(cache.keys(), vec!["huge"]);
        assert_eq!(cache.size(), 150);
        assert!(cache.get("huge").is_some());
    }

    #[test]
    fn test_clear() {
        let cache = build_cache(100);
        for k in &["a", "b", "c"] {
            cache.set(k, blob(20));
        }
        cache.clear();

        assert_eq!(cache.count(), 0);
        assert_eq!(cache.size(), 0);
        assert!(cache.keys().is_empty());
    }

    #[test]
    fn test_returned_values_outlive_eviction() {
        let cache = build_cache(10);
        cache.set("a", blob(10));
        let held = cache.get("a").unwrap();
        cache.set("b", blob(10));

        assert!(!cache.contains("a"));
        assert_eq!(held.len(), 10);
    }

    #[test]
    fn test_resizing() {
        let cache = build_cache(100);
        for k in &["a", "b", "c", "d"] {
            cache.set(k, blob(25));
        }

        cache.set_max_size(50);
        assert_eq!(cache.max_size(), 50);
        assert_eq!(cache.keys(), vec!["d", "c"]);

        assert_eq!(cache.trim_to_size(0), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_from_capacity() {
        let cache: LruMemoryCache<DecodedImage> = LruMemoryCache::from_capacity(
            CostWeigher,
            &MemoryFraction::quarter_of(FixedCapacity(1600)),
        )
        .unwrap();
        assert_eq!(cache.max_size(), 400);

        // 10x10 at 4 bytes a pixel, so only one fits.
        cache.set("x", DecodedImage::blank(10, 10, PixelFormat::Argb8888));
        cache.set("y", DecodedImage::blank(10, 10, PixelFormat::Argb8888));
        assert_eq!(cache.keys(), vec!["y"]);

        let cache = LruMemoryCache::<DecodedImage>::with_max_weight(1000);
        assert_eq!(cache.max_size(), 1000);
    }

    #[test]
    fn test_builder_requires_max_weight() {
        let err = MemoryCacheConfigBuilder::default().build().unwrap_err();
        let err = CapacityError::from(err);
        assert!(matches!(err, CapacityError::Config(_)));
    }

    #[test]
    fn test_as_trait_object() {
        let cache: Box<dyn Cache<Vec<u8>>> = Box::new(build_cache(100));
        cache.set("a", blob(60));
        cache.set("b", blob(60));

        assert!(!cache.contains("a"));
        assert_eq!(cache.count(), 1);
        assert_eq!(cache.size(), 60);
        cache.clear();
        assert_eq!(cache.count(), 0);
    }

    // Writers on disjoint keys racing with each other and with eviction must never lose or double count weight.
    #[test]
    fn test_concurrent_access() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 500;
        const MAX_WEIGHT: u64 = 1000;

        let cache = Arc::new(build_cache(MAX_WEIGHT));
        let handles = (0..THREADS)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        let key = format!("{}-{}", t, i % 50);
                        cache.set(&key, blob(1 + (i % 37)));
                        cache.get(&format!("{}-{}", t, i % 7));
                        if i % 11 == 0 {
                            cache.remove(&key);
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        for h in handles {
            h.join().unwrap();
        }

        let guard = cache.lock();
        let summed: u64 = guard.iter().map(|(_, v)| v.len() as u64).sum();
        assert_eq!(summed, guard.current_weight());
        assert!(guard.current_weight() <= MAX_WEIGHT);
        assert_eq!(guard.iter().count(), guard.len());
    }

    // Writers sharing keys must each replace the previous value whole: no duplicate keys and no weight counted twice.
    #[test]
    fn test_concurrent_access_same_keys() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 1000;
        const KEYS: usize = 5;

        let cache = Arc::new(build_cache(120));
        let handles = (0..THREADS)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        let key = format!("k{}", (t + i) % KEYS);
                        cache.set(&key, blob(1 + (t * 7 + i) % 50));
                        cache.get(&format!("k{}", i % KEYS));
                        if i % 13 == t {
                            cache.remove(&key);
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        for h in handles {
            h.join().unwrap();
        }

        let keys = cache.keys();
        let mut unique = keys.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), keys.len());
        assert_eq!(cache.count(), unique.len());

        let summed: u64 = keys
            .iter()
            .map(|k| cache.get(k).expect("Listed keys are cached").len() as u64)
            .sum();
        assert_eq!(cache.size(), summed);
        assert!(cache.size() <= 120);
    }

    #[test]
    fn test_huge_weights() {
        let cache = LruMemoryCache::new(|w: &u64| *w, MemoryCacheConfig { max_weight: 100 });
        cache.set("a", u64::MAX - 5);
        assert_eq!(cache.size(), u64::MAX - 5);

        // Adding this to the total would overflow, so the oversized entry goes first.
        cache.set("b", 10);
        assert_eq!(cache.keys(), vec!["b"]);
        assert_eq!(cache.size(), 10);

        cache.set("c", u64::MAX);
        assert_eq!(cache.keys(), vec!["c"]);
        assert_eq!(cache.size(), u64::MAX);
        cache.set("c", 7);
        assert_eq!(cache.size(), 7);
    }
}
