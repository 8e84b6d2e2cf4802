//! Process-local cache backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{CacheEntryOptions, CacheError, DistributedCache};

/// Expired entries are swept after this many writes.
const PURGE_EVERY: u64 = 256;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    absolute_deadline: Option<Instant>,
    sliding: Option<Duration>,
    last_access: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        if self.absolute_deadline.is_some_and(|d| now >= d) {
            return true;
        }
        self.sliding.is_some_and(|s| now >= self.last_access + s)
    }
}

/// In-memory [`DistributedCache`]. Expiry is checked lazily on read.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    writes: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| !e.is_expired(now));
    }
}

#[async_trait]
impl DistributedCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let hit = match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.last_access = now;
                Some(entry.value.clone())
            }
            Some(_) => None,
            None => return Ok(None),
        };
        if hit.is_none() {
            self.entries.remove_if(key, |_, e| e.is_expired(now));
        }
        Ok(hit)
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        options: CacheEntryOptions,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                absolute_deadline: options.absolute_expiration.map(|ttl| now + ttl),
                sliding: options.sliding_expiration,
                last_access: now,
            },
        );
        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            self.purge_expired();
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{get_json, set_json};

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn missing_key_is_none() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("nope").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn absolute_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".into(), CacheEntryOptions::absolute(MINUTE))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reads_extend_sliding_window_up_to_absolute_deadline() {
        let cache = MemoryCache::new();
        let opts = CacheEntryOptions::absolute(5 * MINUTE).with_sliding(2 * MINUTE);
        cache.set("k", "v".into(), opts).await.unwrap();

        for _ in 0..4 {
            tokio::time::advance(MINUTE).await;
            assert!(cache.get("k").await.unwrap().is_some());
        }
        tokio::time::advance(MINUTE).await;
        // idle for only one minute, but the absolute deadline has passed
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_entry_expires() {
        let cache = MemoryCache::new();
        let opts = CacheEntryOptions::default().with_sliding(MINUTE);
        cache.set("k", "v".into(), opts).await.unwrap();
        tokio::time::advance(2 * MINUTE).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn json_helpers_round_trip() {
        let cache = MemoryCache::new();
        set_json(&cache, "nums", &vec![1, 2, 3], CacheEntryOptions::default())
            .await
            .unwrap();
        let nums: Option<Vec<i32>> = get_json(&cache, "nums").await.unwrap();
        assert_eq!(nums, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn remove_deletes_entry() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".into(), CacheEntryOptions::default())
            .await
            .unwrap();
        cache.remove("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
