//! Optional read cache.
//!
//! The cache is a collaborator, never a dependency: every failure is
//! swallowed and logged, and a missing cache simply means every read hits
//! the store. Write paths only ever invalidate.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// JSON-valued cache with per-entry TTL.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<serde_json::Value>;
    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration);
    async fn invalidate(&self, key: &str);
}

/// Cache that stores nothing; the default when no backend is configured.
pub struct NoopCache;

#[async_trait]
impl Cache for NoopCache {
    async fn get(&self, _key: &str) -> Option<serde_json::Value> {
        None
    }
    async fn set(&self, _key: &str, _value: serde_json::Value, _ttl: Duration) {}
    async fn invalidate(&self, _key: &str) {}
}

/// Process-local cache with lazy expiry.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, (serde_json::Value, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries (housekeeping).
    pub async fn evict_expired(&self) {
        let now = Instant::now();
        self.entries
            .write()
            .await
            .retain(|_, (_, expires_at)| *expires_at > now);
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let entries = self.entries.read().await;
        let (value, expires_at) = entries.get(key)?;
        if *expires_at <= Instant::now() {
            return None;
        }
        Some(value.clone())
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, Instant::now() + ttl));
    }

    async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}

/// Cache key for a country's statistics.
pub fn country_stats_key(country: crate::common::types::Country) -> String {
    format!("stats:country:{country}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Country;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = InMemoryCache::new();
        cache
            .set("k", json!({"total": 3}), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("k").await, Some(json!({"total": 3})));
    }

    #[tokio::test]
    async fn invalidate_removes_the_entry() {
        let cache = InMemoryCache::new();
        cache.set("k", json!(1), Duration::from_secs(60)).await;
        cache.invalidate("k").await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_their_ttl() {
        let cache = InMemoryCache::new();
        cache.set("k", json!(1), Duration::from_secs(10)).await;

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("k").await, None);

        cache.evict_expired().await;
        assert!(cache.entries.read().await.is_empty());
    }

    #[tokio::test]
    async fn noop_cache_never_stores() {
        let cache = NoopCache;
        cache.set("k", json!(1), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[test]
    fn stats_keys_are_per_country() {
        assert_eq!(country_stats_key(Country::ES), "stats:country:ES");
        assert_ne!(
            country_stats_key(Country::ES),
            country_stats_key(Country::BR)
        );
    }
}
