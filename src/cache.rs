// cache.rs
// Small in-process TTL cache. Entries are not shared between server instances.

use std::{
    collections::HashMap,
    hash::Hash,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;

pub const PROFILE_TTL: Duration = Duration::from_secs(5 * 60);

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, (Instant, V)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
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
        entries
            .get(key)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        entries.insert(key, (Instant::now(), value));
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_fresh_entries() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("u1", 7).await;
        assert_eq!(cache.get(&"u1").await, Some(7));
        assert_eq!(cache.get(&"u2").await, None);
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.insert("u1", 7).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get(&"u1").await, None);
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = TtlCache::new(PROFILE_TTL);
        cache.insert(1u8, "alice".to_string()).await;
        cache.invalidate(&1u8).await;
        assert!(cache.get(&1u8).await.is_none());
    }
}
