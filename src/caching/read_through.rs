//! # Read-Through Cache
//!
//! Serves the three lookup kinds of the inbound surface (chapter listing,
//! node by URL, search) from the cache store, falling back to the fetch
//! gateway on a miss.
//!
//! Rules applied to every lookup:
//! - a store read error counts as a miss; a store write error is logged and
//!   the request still succeeds
//! - upstream failures propagate to the caller and nothing is cached
//! - a chapters or node miss queues a pre-cache walk of the fetched payload
//! - a search miss also caches a minimal projection of every result entity,
//!   without replacing any existing entry for that entity

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::key_generator::{chapters_key, node_key, release_endpoint, search_key, SearchQuery};
use super::precache::{child_urls, PrecacheJob, PrecacheQueue};
use super::stores::CacheStore;
use crate::core::config::ProxyConfig;
use crate::core::error::ProxyResult;
use crate::observability::metrics::record_cache_lookup;
use crate::upstream::FetchGateway;

/// Configuration for the read-through cache.
#[derive(Debug, Clone)]
pub struct ReadThroughConfig {
    /// Base URL of the taxonomy API, without trailing slash
    pub base_url: String,
    /// TTL for chapter listings and nodes
    pub node_ttl: Duration,
    /// TTL for search results
    pub search_ttl: Duration,
    /// Depth budget of walks queued after a miss
    pub on_miss_depth: u32,
}

impl Default for ReadThroughConfig {
    fn default() -> Self {
        Self {
            base_url: "https://id.who.int/icd".to_string(),
            node_ttl: Duration::from_secs(12 * 60 * 60),
            search_ttl: Duration::from_secs(60 * 60),
            on_miss_depth: 1,
        }
    }
}

impl ReadThroughConfig {
    pub fn from_proxy_config(config: &ProxyConfig) -> Self {
        Self {
            base_url: config.upstream.base_url.trim_end_matches('/').to_string(),
            node_ttl: config.cache.node_ttl,
            search_ttl: config.cache.search_ttl,
            on_miss_depth: config.precache.on_miss_depth,
        }
    }

    /// Set the base URL.
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the depth budget of miss-driven walks.
    pub fn with_on_miss_depth(mut self, depth: u32) -> Self {
        self.on_miss_depth = depth;
        self
    }
}

pub struct ReadThroughCache {
    store: Arc<dyn CacheStore>,
    gateway: Arc<FetchGateway>,
    queue: Arc<PrecacheQueue>,
    config: ReadThroughConfig,
}

impl ReadThroughCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        gateway: Arc<FetchGateway>,
        queue: Arc<PrecacheQueue>,
        config: ReadThroughConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            queue,
            config,
        }
    }

    /// Chapter listing (the linearization root) of a release
    pub async fn chapters(&self, release_id: &str) -> ProxyResult<Value> {
        let key = chapters_key(release_id);
        if let Some(value) = self.lookup("chapters", &key).await {
            return Ok(value);
        }

        let url = self.release_url(release_id);
        let value = self.gateway.fetch(&url).await?;
        self.store_value(&key, &value, self.config.node_ttl).await;
        self.queue_walk(&url, &value);
        Ok(value)
    }

    /// Any node addressed by its full URL
    pub async fn node(&self, url: &str) -> ProxyResult<Value> {
        let key = node_key(url);
        if let Some(value) = self.lookup("node", &key).await {
            return Ok(value);
        }

        let value = self.gateway.fetch(url).await?;
        self.store_value(&key, &value, self.config.node_ttl).await;
        self.queue_walk(url, &value);
        Ok(value)
    }

    /// Search within a release
    pub async fn search(&self, release_id: &str, query: &SearchQuery) -> ProxyResult<Value> {
        let params = query.to_params();
        let key = search_key(release_id, &params);
        if let Some(value) = self.lookup("search", &key).await {
            return Ok(value);
        }

        let url = format!("{}/search", self.release_url(release_id));
        let value = self
            .gateway
            .fetch_with_query(&url, &params.to_query_pairs())
            .await?;
        self.store_value(&key, &value, self.config.search_ttl).await;
        self.cache_entity_projections(&value).await;
        Ok(value)
    }

    pub fn config(&self) -> &ReadThroughConfig {
        &self.config
    }

    fn release_url(&self, release_id: &str) -> String {
        format!("{}/{}", self.config.base_url, release_endpoint(release_id))
    }

    async fn lookup(&self, resource: &'static str, key: &str) -> Option<Value> {
        let cached = match self.store.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %key, "Ignoring undecodable cache entry: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, "Cache read failed, treating as miss: {}", e);
                None
            }
        };

        record_cache_lookup(resource, cached.is_some());
        debug!(key = %key, hit = cached.is_some(), "Cache lookup");
        cached
    }

    async fn store_value(&self, key: &str, value: &Value, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, "Failed to serialize payload for cache: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.set(key, &bytes, ttl).await {
            warn!(key = %key, "Cache write failed: {}", e);
        }
    }

    fn queue_walk(&self, url: &str, payload: &Value) {
        if self.config.on_miss_depth == 0 || child_urls(payload).is_empty() {
            return;
        }

        self.queue.submit(PrecacheJob {
            root_url: url.to_string(),
            payload: Some(payload.clone()),
            depth: self.config.on_miss_depth,
        });
    }

    async fn cache_entity_projections(&self, search_result: &Value) {
        let Some(entities) = search_result.get("destinationEntities").and_then(Value::as_array) else {
            return;
        };

        for entity in entities {
            let Some(id) = entity.get("id").and_then(Value::as_str) else {
                continue;
            };

            let projection = project_entity(entity);
            let bytes = match serde_json::to_vec(&projection) {
                Ok(bytes) => bytes,
                Err(_) => continue,
            };

            match self
                .store
                .set_if_absent(&node_key(id), &bytes, self.config.node_ttl)
                .await
            {
                Ok(written) => debug!(id = %id, written, "Search entity projection"),
                Err(e) => warn!(id = %id, "Failed to cache search entity: {}", e),
            }
        }
    }
}

/// Minimal node view of a search result entity
pub fn project_entity(entity: &Value) -> Value {
    let code = entity
        .get("theCode")
        .or_else(|| entity.get("code"))
        .cloned()
        .unwrap_or(Value::Null);

    json!({
        "id": entity.get("id").cloned().unwrap_or(Value::Null),
        "title": entity.get("title").cloned().unwrap_or(Value::Null),
        "code": code,
        "browserUrl": entity.get("browserUrl").cloned().unwrap_or(Value::Null),
    })
}
