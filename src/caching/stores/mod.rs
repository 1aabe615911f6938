//! # Cache Stores Module
//!
//! This module provides the cache store abstraction and its in-memory and
//! Redis-based implementations. Values are opaque bytes; every entry carries a
//! TTL and disappears once it expires.

pub mod memory;
pub mod redis_store;

pub use memory::{InMemoryCache, InMemoryCacheConfig};
pub use redis_store::{RedisCache, RedisCacheConfig};

use super::CacheResult;
use crate::core::config::{CacheBackend, CacheConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Cache entry held by the in-memory store
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached value
    pub value: Vec<u8>,

    /// When the entry stops being served
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Create a new cache entry expiring `ttl` from now
    pub fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    /// Check if the entry is expired
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Trait for cache store implementations
///
/// Entries are immutable once written: `set` replaces an entry wholesale and
/// `set_if_absent` never touches an unexpired one.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get an unexpired value from the cache
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Set a value in the cache with TTL, replacing any existing entry
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Set a value only if no unexpired entry exists for the key
    ///
    /// Returns `true` when the value was written.
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<bool>;

    /// Check if an unexpired entry exists for the key
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Count unexpired entries whose key starts with `prefix`
    async fn count_prefix(&self, prefix: &str) -> CacheResult<usize>;

    /// Get cache statistics
    async fn stats(&self) -> CacheResult<CacheStoreStats>;

    /// Perform health check
    async fn health_check(&self) -> CacheResult<bool>;
}

/// Cache store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStoreStats {
    /// Number of entries
    pub entries: usize,

    /// Number of hits
    pub hits: u64,

    /// Number of misses
    pub misses: u64,

    /// Number of expired entries cleaned up
    pub expired_cleanups: u64,
}

/// Build the store selected by the configuration
pub async fn build_store(config: &CacheConfig) -> CacheResult<Arc<dyn CacheStore>> {
    match config.backend {
        CacheBackend::Memory => {
            let store = InMemoryCache::new(InMemoryCacheConfig {
                max_entries: config.max_entries,
                cleanup_interval: config.cleanup_interval,
            })?;
            info!(max_entries = config.max_entries, "Using in-memory cache store");
            Ok(Arc::new(store))
        }
        CacheBackend::Redis => {
            let store = RedisCache::new(RedisCacheConfig {
                url: config.redis_url.clone(),
                key_prefix: config.key_prefix.clone(),
            })
            .await?;
            Ok(Arc::new(store))
        }
    }
}
