use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How long an entry should live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ttl {
    /// Use the cache's configured default TTL.
    Default,
    /// Expire after this many seconds. Zero means [`Ttl::Default`].
    Seconds(u64),
    /// Never expire.
    Never,
}

/// In-memory key/value cache with per-entry expiry.
///
/// Expired entries are never returned by [`TtlCache::get`], whether or not the
/// background sweep has removed them yet. There is no size bound: the key
/// count grows with the number of distinct keys set inside one TTL.
pub struct TtlCache<V = Value> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

struct CacheEntry<V> {
    value: V,
    /// `None` means the entry never expires.
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Point-in-time cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub keys: usize,
    pub hits: u64,
    pub misses: u64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Store `value` under `key`, replacing any existing entry.
    ///
    /// Returns `false` if the value could not be stored. That is a degraded
    /// cache, not a request failure: callers carry on without caching.
    pub fn set(&self, key: &str, value: V, ttl: Ttl) -> bool {
        let lifetime = match ttl {
            Ttl::Never => None,
            Ttl::Seconds(0) | Ttl::Default => Some(self.default_ttl),
            Ttl::Seconds(secs) => Some(Duration::from_secs(secs)),
        };
        // A TTL past the clock's range can never elapse.
        let expires_at = lifetime.and_then(|lifetime| {
            let at = Instant::now().checked_add(lifetime);
            if at.is_none() {
                tracing::warn!(key = %key, ttl = ?ttl, "TTL out of range, entry will not expire");
            }
            at
        });

        let Ok(mut entries) = self.entries.write() else {
            tracing::warn!(key = %key, "Cache lock poisoned, value not stored");
            return false;
        };
        entries.insert(key.to_string(), CacheEntry { value, expires_at });
        tracing::debug!(key = %key, ttl = ?ttl, "Cache set");
        true
    }

    /// Get a cached value if it exists and hasn't expired. Reads do not
    /// extend the TTL.
    pub fn get(&self, key: &str) -> Option<V> {
        let found = match self.entries.read() {
            Ok(entries) => entries
                .get(key)
                .filter(|entry| !entry.is_expired(Instant::now()))
                .map(|entry| entry.value.clone()),
            Err(_) => None,
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("cache.hit").increment(1);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("cache.miss").increment(1);
        }
        found
    }

    /// Remove `key`. Returns the number of entries removed (0 or 1).
    pub fn delete(&self, key: &str) -> usize {
        match self.entries.write() {
            Ok(mut entries) => usize::from(entries.remove(key).is_some()),
            Err(_) => 0,
        }
    }

    /// Drop every entry.
    pub fn flush(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
        tracing::info!("Cache flushed");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            keys: self.entries.read().map(|e| e.len()).unwrap_or(0),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Evict every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };

        let before = entries.len();
        entries.retain(|key, entry| {
            let expired = entry.is_expired(now);
            if expired {
                tracing::debug!(key = %key, "Cache expired");
            }
            !expired
        });
        before - entries.len()
    }
}

/// Spawn the periodic expiry sweep. The task runs until aborted.
pub fn spawn_sweep_task<V>(cache: Arc<TtlCache<V>>, interval: Duration) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        tracing::info!(interval_s = interval.as_secs(), "Cache sweep task started");

        loop {
            tokio::time::sleep(interval).await;

            let evicted = cache.sweep();
            if evicted > 0 {
                metrics::counter!("cache.evicted").increment(evicted as u64);
                tracing::debug!(evicted, "Cache sweep evicted expired entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> TtlCache {
        TtlCache::new(Duration::from_secs(600))
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_then_expiry() {
        let cache = cache();
        assert!(cache.get("weather:current:London").is_none());

        assert!(cache.set("weather:current:London", json!({ "temp": 12 }), Ttl::Seconds(5)));
        assert_eq!(cache.get("weather:current:London"), Some(json!({ "temp": 12 })));

        tokio::time::advance(Duration::from_secs(6)).await;
        // Sweep has not run; the read itself must reject the stale entry.
        assert!(cache.get("weather:current:London").is_none());
        assert_eq!(cache.stats().keys, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_is_stored_without_expiry() {
        let cache = cache();
        assert!(cache.set("k", json!(1), Ttl::Seconds(u64::MAX)));

        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert_eq!(cache.get("k"), Some(json!(1)));
        assert_eq!(cache.sweep(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_uses_default() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.set("a", json!(1), Ttl::Seconds(0));
        cache.set("b", json!(2), Ttl::Default);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get("a"), Some(json!(1)));
        assert_eq!(cache.get("b"), Some(json!(2)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_expires() {
        let cache = TtlCache::new(Duration::from_secs(1));
        cache.set("pinned", json!("x"), Ttl::Never);
        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert_eq!(cache.get("pinned"), Some(json!("x")));
        assert_eq!(cache.sweep(), 0);
    }

    #[test]
    fn test_overwrite_returns_latest() {
        let cache = cache();
        cache.set("k", json!("v1"), Ttl::Default);
        cache.set("k", json!("v2"), Ttl::Default);
        assert_eq!(cache.get("k"), Some(json!("v2")));
        assert_eq!(cache.stats().keys, 1);
    }

    #[test]
    fn test_delete_and_flush() {
        let cache = cache();
        cache.set("a", json!(1), Ttl::Default);
        cache.set("b", json!(2), Ttl::Default);

        assert_eq!(cache.delete("a"), 1);
        assert_eq!(cache.delete("a"), 0);
        assert!(cache.get("a").is_none());

        cache.flush();
        assert_eq!(cache.stats().keys, 0);
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_stats_count_hits_and_misses() {
        let cache = cache();
        cache.set("a", json!(1), Ttl::Default);
        cache.get("a");
        cache.get("a");
        cache.get("missing");

        assert_eq!(
            cache.stats(),
            CacheStats {
                keys: 1,
                hits: 2,
                misses: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_only_expired() {
        let cache = cache();
        cache.set("short", json!(1), Ttl::Seconds(1));
        cache.set("long", json!(2), Ttl::Seconds(100));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.stats().keys, 1);
        assert_eq!(cache.get("long"), Some(json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_task_runs_on_interval() {
        let cache = Arc::new(cache());
        cache.set("short", json!(1), Ttl::Seconds(1));

        let handle = spawn_sweep_task(Arc::clone(&cache), Duration::from_secs(120));

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert_eq!(cache.stats().keys, 0);

        handle.abort();
    }
}
