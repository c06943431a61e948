//! In-process cache backed by `DashMap`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{cache::CachePort, model::WeatherData};

#[derive(Debug, Clone)]
struct Entry {
    value: WeatherData,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Expiring in-memory [`CachePort`].
///
/// Expired entries read as absent and are dropped when their key is read again. Keys that
/// are never read again stay in the map, so a long-lived process should call
/// [`MemoryCache::purge_expired`] periodically.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl CachePort for MemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<WeatherData>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn put(&self, key: &str, value: &WeatherData, ttl: Duration) -> anyhow::Result<()> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| anyhow::anyhow!("TTL of {}s is out of range", ttl.as_secs()))?;
        self.entries.insert(
            key.to_owned(),
            Entry {
                value: value.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.entries.clear();
        Ok(())
    }
}
