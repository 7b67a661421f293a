//! In-memory key/value cache with per-entry expiry.
//!
//! Expiry is lazy: an entry past its deadline is removed by the `get` that
//! observes it. There is no background sweep and no size bound.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Cache entry with its expiry deadline
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Thread-safe TTL cache keyed by string
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    store: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache whose entries live for `ttl` unless overridden on `set`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            store: Mutex::new(HashMap::new()),
        }
    }

    /// Default time-to-live for new entries
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a live value, dropping it if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut store = self.store.lock().unwrap();
        let entry = store.get(key)?;

        if entry.is_expired(Instant::now()) {
            store.remove(key);
            return None;
        }

        Some(entry.value.clone())
    }

    /// Insert or overwrite a value, resetting its expiry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl_override: Option<Duration>) {
        let ttl = ttl_override.unwrap_or(self.ttl);
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.store.lock().unwrap().insert(key.into(), entry);
    }

    /// Remove one key, or everything when `key` is `None`.
    pub fn clear(&self, key: Option<&str>) {
        let mut store = self.store.lock().unwrap();
        match key {
            Some(key) => {
                store.remove(key);
            }
            None => store.clear(),
        }
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_get_after_set_returns_value() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("networks", vec![1, 2, 3], None);

        assert_eq!(cache.get("networks"), Some(vec![1, 2, 3]));
        assert_eq!(cache.get("tokens"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_removed_on_read() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("networks", "eth".to_string(), None);

        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(cache.get("networks"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_is_live_until_deadline() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("k", 1u32, None);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.get("k"), Some(1));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_override() {
        let cache = TtlCache::new(Duration::from_secs(600));
        cache.set("short", 1u32, Some(Duration::from_secs(5)));
        cache.set("long", 2u32, None);

        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.get("long"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_overwrites_and_resets_expiry() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("k", 1u32, None);

        tokio::time::advance(Duration::from_secs(50)).await;
        cache.set("k", 2u32, None);

        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test]
    async fn test_clear_single_key_and_all() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("a", 1u32, None);
        cache.set("b", 2u32, None);

        cache.clear(Some("a"));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));

        cache.clear(None);
        assert!(cache.is_empty());
    }
}
