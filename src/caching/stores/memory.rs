//! # In-Memory Cache Store
//!
//! A DashMap-backed cache with per-entry TTL and a background task that sweeps
//! expired entries. The store holds at most `max_entries` keys; once full it
//! refuses new keys with [`CacheError::Full`] instead of evicting.

use super::{CacheEntry, CacheStore, CacheStoreStats};
use crate::caching::{CacheError, CacheResult};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::debug;

/// In-memory cache configuration
#[derive(Debug, Clone)]
pub struct InMemoryCacheConfig {
    /// Maximum number of entries
    pub max_entries: usize,

    /// Cleanup interval for expired entries
    pub cleanup_interval: Duration,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// In-memory cache implementation
pub struct InMemoryCache {
    config: InMemoryCacheConfig,

    entries: Arc<DashMap<String, CacheEntry>>,

    hits: AtomicU64,
    misses: AtomicU64,
    expired_cleanups: Arc<AtomicU64>,

    cleanup_task: tokio::task::JoinHandle<()>,
}

impl InMemoryCache {
    /// Create a new in-memory cache
    ///
    /// Must be called from within a Tokio runtime, which drives the cleanup task.
    pub fn new(config: InMemoryCacheConfig) -> CacheResult<Self> {
        if config.max_entries == 0 {
            return Err(CacheError::Store {
                message: "max_entries must be greater than 0".to_string(),
            });
        }

        let entries = Arc::new(DashMap::new());
        let expired_cleanups = Arc::new(AtomicU64::new(0));

        let cleanup_task = {
            let entries = entries.clone();
            let expired_cleanups = expired_cleanups.clone();
            let cleanup_interval = config.cleanup_interval;

            tokio::spawn(async move {
                let mut interval = interval(cleanup_interval);
                loop {
                    interval.tick().await;
                    Self::cleanup_expired_entries(&entries, &expired_cleanups);
                }
            })
        };

        Ok(Self {
            config,
            entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired_cleanups,
            cleanup_task,
        })
    }

    /// Remove expired entries, returning how many were dropped
    fn cleanup_expired_entries(entries: &DashMap<String, CacheEntry>, expired_cleanups: &AtomicU64) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        let cleaned = before.saturating_sub(entries.len());

        if cleaned > 0 {
            expired_cleanups.fetch_add(cleaned as u64, Ordering::Relaxed);
            debug!("Cleaned up {} expired cache entries", cleaned);
        }

        cleaned
    }

    /// Make room for `key` if it is not already present
    ///
    /// Must not be called while holding a reference into `entries`.
    fn ensure_capacity(&self, key: &str) -> CacheResult<()> {
        if self.entries.contains_key(key) || self.entries.len() < self.config.max_entries {
            return Ok(());
        }

        Self::cleanup_expired_entries(&self.entries, &self.expired_cleanups);

        if self.entries.len() >= self.config.max_entries {
            return Err(CacheError::Full {
                limit: self.config.max_entries,
            });
        }

        Ok(())
    }
}

impl Drop for InMemoryCache {
    fn drop(&mut self) {
        self.cleanup_task.abort();
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let value = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => None,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };

        match value {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            None => {
                if self.entries.remove_if(key, |_, entry| entry.is_expired()).is_some() {
                    self.expired_cleanups.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.ensure_capacity(key)?;
        self.entries
            .insert(key.to_string(), CacheEntry::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<bool> {
        self.ensure_capacity(key)?;

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(CacheEntry::new(value.to_vec(), ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(value.to_vec(), ttl));
                Ok(true)
            }
        }
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self
            .entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false))
    }

    async fn count_prefix(&self, prefix: &str) -> CacheResult<usize> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.value().is_expired())
            .count())
    }

    async fn stats(&self) -> CacheResult<CacheStoreStats> {
        Ok(CacheStoreStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired_cleanups: self.expired_cleanups.load(Ordering::Relaxed),
        })
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(!self.cleanup_task.is_finished())
    }
}
