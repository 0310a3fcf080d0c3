use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// Cache-aside store for short-lived read projections.
///
/// Entries expire after `ttl`, but the consistency contract is invalidation:
/// the accumulate step removes the affected entries synchronously, so a hit
/// is never staler than the last successful counter write for that entity.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, Entry<V>>>,
}

#[derive(Debug)]
struct Entry<V> {
    stored_at: Instant,
    value: V,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Inserts a value and sweeps expired entries, so the map never holds
    /// more than one generation of dead keys. Miss-heavy traffic (e.g. a
    /// client spraying bogus secrets) writes on every lookup and therefore
    /// keeps the map bounded to live entries.
    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.stored_at.elapsed() <= self.ttl);
        entries.insert(
            key,
            Entry {
                stored_at: Instant::now(),
                value,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn invalidate(&self, key: &K) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }

    /// Returns the cached value or runs `loader` and caches its result.
    /// Loader errors are propagated and nothing is cached.
    pub async fn get_or_load<F, Fut, E>(&self, key: K, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }
        let value = loader().await?;
        self.insert(key, value.clone()).await;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache: TtlCache<&str, i64> = TtlCache::new(Duration::from_millis(30));
        cache.insert("k", 1).await;
        assert_eq!(cache.get(&"k").await, Some(1));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get(&"k").await, None);
    }

    #[tokio::test]
    async fn invalidate_removes_immediately() {
        let cache: TtlCache<&str, i64> = TtlCache::new(Duration::from_secs(60));
        cache.insert("k", 1).await;
        cache.invalidate(&"k").await;
        assert_eq!(cache.get(&"k").await, None);
    }

    #[tokio::test]
    async fn insert_sweeps_expired_entries() {
        let cache: TtlCache<String, Option<i64>> = TtlCache::new(Duration::from_millis(10));
        for i in 0..1000 {
            cache.insert(format!("sk-bogus-{i}"), None).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        cache.insert("sk-live".to_string(), Some(1)).await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&"sk-live".to_string()).await, Some(Some(1)));
    }

    #[tokio::test]
    async fn get_or_load_caches_success_only() {
        let cache: TtlCache<&str, i64> = TtlCache::new(Duration::from_secs(60));
        let err: Result<i64, &str> = cache.get_or_load("k", || async { Err("boom") }).await;
        assert!(err.is_err());
        assert_eq!(cache.get(&"k").await, None);

        let ok: Result<i64, &str> = cache.get_or_load("k", || async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);
        // Second load must hit the cache, not the loader.
        let hit: Result<i64, &str> = cache.get_or_load("k", || async { Err("boom") }).await;
        assert_eq!(hit.unwrap(), 7);
    }
}
