//! # Redis Cache Store
//!
//! Redis-backed implementation of [`CacheStore`]. Expiry is delegated to Redis
//! (`SET .. EX`), write-if-absent maps to `SET .. NX EX`, and prefix counts
//! walk the keyspace with `SCAN MATCH`.

use super::{CacheStore, CacheStoreStats};
use crate::caching::CacheResult;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Redis cache configuration
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    /// Redis connection URL
    pub url: String,

    /// Key prefix for all cache entries
    pub key_prefix: String,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: String::new(),
        }
    }
}

/// Redis cache implementation
///
/// `ConnectionManager` reconnects on its own and is cheap to clone, so each
/// operation works on its own handle.
pub struct RedisCache {
    config: RedisCacheConfig,

    connection: ConnectionManager,

    hits: AtomicU64,
    misses: AtomicU64,
}

impl RedisCache {
    /// Connect to Redis
    pub async fn new(config: RedisCacheConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let connection = ConnectionManager::new(client).await?;

        info!("Redis cache connected to {}", config.url);

        Ok(Self {
            config,
            connection,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Get the full cache key with prefix
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// Redis expiry has one-second resolution and rejects zero
    fn ttl_seconds(ttl: Duration) -> u64 {
        ttl.as_secs().max(1)
    }

    async fn scan_count(&self, pattern: &str) -> CacheResult<usize> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut count = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(1000)
                .query_async(&mut conn)
                .await?;

            count += keys.len();

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        Ok(count)
    }
}

/// Escape the glob metacharacters `SCAN MATCH` understands
fn escape_glob(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = conn.get(self.full_key(key)).await?;

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Redis cache hit for key: {}", key);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Redis cache miss for key: {}", key);
        }

        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(self.full_key(key), value, Self::ttl_seconds(ttl))
            .await?;

        debug!("Set Redis cache key: {} with TTL: {:?}", key, ttl);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.full_key(key))
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(Self::ttl_seconds(ttl))
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(self.full_key(key)).await?;
        Ok(exists)
    }

    async fn count_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let pattern = format!("{}*", escape_glob(&self.full_key(prefix)));
        self.scan_count(&pattern).await
    }

    async fn stats(&self) -> CacheResult<CacheStoreStats> {
        let pattern = format!("{}*", escape_glob(&self.config.key_prefix));
        let entries = self.scan_count(&pattern).await?;

        Ok(CacheStoreStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            // Redis handles TTL cleanup internally
            expired_cleanups: 0,
        })
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let result = redis::cmd("PING").query_async::<_, String>(&mut conn).await;

        match result {
            Ok(response) => Ok(response == "PONG"),
            Err(_) => Ok(false),
        }
    }
}
