//! # Caching System Module
//!
//! Everything the proxy serves goes through a cache store first. This module
//! holds the store abstraction and its two backends, the key formats, the
//! read-through layer used by the HTTP handlers, and the pre-fetch engine that
//! warms the taxonomy tree ahead of demand.
//!
//! ## Architecture
//! 1. **Cache Stores**: in-memory (DashMap) and Redis implementations of [`CacheStore`]
//! 2. **Key Generator**: the exact key formats for chapters, nodes and searches
//! 3. **Read-Through Cache**: lookup, fetch on miss, store with the resource TTL
//! 4. **Pre-Cache Engine**: depth-bounded walk of a node's descendants
//! 5. **Admin Interface**: per-prefix entry counts and store health
//!
//! ## Usage Example
//! ```rust,ignore
//! let store: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new(InMemoryCacheConfig::default())?);
//! let key = key_generator::node_key("https://id.who.int/icd/entity/1435254666");
//!
//! store.set(&key, br#"{"title":"..."}"#, Duration::from_secs(43_200)).await?;
//! if let Some(bytes) = store.get(&key).await? {
//!     // serve cached payload
//! }
//! ```

pub mod stores;
pub mod key_generator;
pub mod read_through;
pub mod precache;
pub mod admin;

pub use stores::{build_store, CacheStore, CacheStoreStats, InMemoryCache, InMemoryCacheConfig, RedisCache, RedisCacheConfig};
pub use key_generator::{SearchParams, SearchQuery};
pub use read_through::{ReadThroughCache, ReadThroughConfig};
pub use precache::{PrecacheEngine, PrecacheJob, PrecacheQueue, WalkReport};
pub use admin::{CacheAdmin, CacheStatsReport};

/// Cache operation result
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache is full ({limit} entries)")]
    Full { limit: usize },
}
