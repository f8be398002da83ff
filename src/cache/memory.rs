//! 进程内 LRU 缓存存储

use async_trait::async_trait;
use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::Duration;

use crate::cache::{CacheEntry, CacheStore};
use crate::error::{AppError, Result};

/// 容量受限的 LRU 存储，读取时惰性淘汰过期条目
pub struct MemoryCacheStore {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| AppError::Config("cache capacity must be positive".into()))?;
        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

}

/// 清理所有过期条目，返回清理数量
fn prune_expired(entries: &mut LruCache<String, CacheEntry>) -> usize {
    let now = Utc::now();
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| entry.is_expired(now))
        .map(|(key, _)| key.clone())
        .collect();

    for key in &expired {
        entries.pop(key);
    }
    expired.len()
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock();
        let now = Utc::now();

        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Ok(Some(entry.response_text.clone())),
            Some(_) => {
                entries.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(key, value, ttl);
        let mut entries = self.entries.lock();
        // 满容量时优先腾出过期条目，而不是淘汰仍有效的最久未用条目
        if entries.len() == entries.cap().get() && !entries.contains(key) {
            prune_expired(&mut entries);
        }
        entries.put(key.to_string(), entry);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let store = MemoryCacheStore::new(4).unwrap();
        store
            .set("janus:2026:abc", "768 kg", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            store.get("janus:2026:abc").await.unwrap().as_deref(),
            Some("768 kg")
        );
        assert!(store.get("janus:2025:abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let store = MemoryCacheStore::new(4).unwrap();
        store.set("k", "v", Duration::ZERO).await.unwrap();

        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recent() {
        let store = MemoryCacheStore::new(2).unwrap();
        let ttl = Duration::from_secs(60);
        store.set("a", "1", ttl).await.unwrap();
        store.set("b", "2", ttl).await.unwrap();
        store.get("a").await.unwrap();
        store.set("c", "3", ttl).await.unwrap();

        assert!(store.get("b").await.unwrap().is_none());
        assert!(store.get("a").await.unwrap().is_some());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_full_store_drops_expired_before_live_entries() {
        let store = MemoryCacheStore::new(2).unwrap();
        let ttl = Duration::from_secs(60);
        store.set("fresh", "y", ttl).await.unwrap();
        store.set("old", "x", Duration::ZERO).await.unwrap();

        store.set("new", "z", ttl).await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.get("fresh").await.unwrap().is_some());
        assert!(store.get("new").await.unwrap().is_some());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(MemoryCacheStore::new(0).is_err());
    }
}
