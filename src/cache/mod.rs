//! Injectable caches for configuration lookups.

use crate::error::{TransformError, TransformResult};
use log::warn;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Key/value cache with explicit eviction.
pub trait ConfigCache<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;
    fn put(&self, key: &str, value: V);
    fn evict(&self, key: &str);
}

/// Bounded least-recently-used cache behind a mutex.
///
/// A poisoned lock is treated as a miss, so callers fall back to the store.
pub struct LruConfigCache<V> {
    inner: Mutex<LruCache<String, V>>,
}

impl<V> LruConfigCache<V> {
    pub fn new(capacity: usize) -> TransformResult<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            TransformError::Configuration("Cache capacity must be at least 1".to_string())
        })?;
        Ok(Self {
            inner: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone + Send> ConfigCache<V> for LruConfigCache<V> {
    fn get(&self, key: &str) -> Option<V> {
        match self.inner.lock() {
            Ok(mut cache) => cache.get(key).cloned(),
            Err(_) => {
                warn!("Config cache lock poisoned; treating '{}' as a miss", key);
                None
            }
        }
    }

    fn put(&self, key: &str, value: V) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(key.to_string(), value);
        }
    }

    fn evict(&self, key: &str) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.pop(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_evict() {
        let cache = LruConfigCache::new(4).unwrap();
        cache.put("a", 1);
        assert_eq!(cache.get("a"), Some(1));
        cache.evict("a");
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_least_recently_used_is_dropped() {
        let cache = LruConfigCache::new(2).unwrap();
        cache.put("a", 1);
        cache.put("b", 2);
        cache.get("a");
        cache.put("c", 3);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(LruConfigCache::<u8>::new(0).is_err());
    }
}
