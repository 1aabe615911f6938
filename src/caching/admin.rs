//! # Cache Admin Interface
//!
//! Introspection over the cache store: how many entries each key family
//! holds, whether the store answers, and whether a full-tree refresh is in
//! flight. Manual refreshes go through the same [`CacheRefresher`] the
//! periodic loop uses.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::key_generator::KEY_PREFIXES;
use super::stores::{CacheStore, CacheStoreStats};
use crate::core::error::ProxyResult;
use crate::scheduler::{CacheRefresher, LastRefresh, RefreshTrigger};

/// Cache statistics response
#[derive(Debug, Serialize)]
pub struct CacheStatsReport {
    /// Unexpired entries per key prefix
    pub entries: BTreeMap<String, usize>,
    pub total: usize,
    pub store: CacheStoreStats,
    pub healthy: bool,
    pub refresh_in_progress: bool,
    pub last_refresh: Option<LastRefresh>,
    pub timestamp: DateTime<Utc>,
}

pub struct CacheAdmin {
    store: Arc<dyn CacheStore>,
    refresher: Arc<CacheRefresher>,
}

impl CacheAdmin {
    pub fn new(store: Arc<dyn CacheStore>, refresher: Arc<CacheRefresher>) -> Self {
        Self { store, refresher }
    }

    /// Snapshot of the cache
    ///
    /// An unreachable store is reported through `healthy: false` with zero
    /// counts and default store stats, never as an error.
    pub async fn stats(&self) -> ProxyResult<CacheStatsReport> {
        let mut healthy = true;
        let mut entries = BTreeMap::new();
        for prefix in KEY_PREFIXES {
            let count = self.store.count_prefix(prefix).await.unwrap_or_else(|e| {
                warn!(prefix = %prefix, "Failed to count cache entries: {}", e);
                healthy = false;
                0
            });
            entries.insert(prefix.trim_end_matches(':').to_string(), count);
        }
        let total = entries.values().sum();

        let store_stats = self.store.stats().await.unwrap_or_else(|e| {
            warn!("Failed to read cache store stats: {}", e);
            healthy = false;
            CacheStoreStats::default()
        });

        healthy &= match self.store.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!("Cache store health check failed: {}", e);
                false
            }
        };

        let report = CacheStatsReport {
            entries,
            total,
            store: store_stats,
            healthy,
            refresh_in_progress: self.refresher.is_running(),
            last_refresh: self.refresher.last_refresh(),
            timestamp: Utc::now(),
        };

        info!("Cache stats requested - entries: {}, healthy: {}", report.total, report.healthy);
        Ok(report)
    }

    /// Start a full-tree refresh unless one is already running
    pub fn trigger_refresh(&self) -> RefreshTrigger {
        let trigger = self.refresher.trigger();
        info!(?trigger, "Manual cache refresh requested");
        trigger
    }

    pub fn refresher(&self) -> &Arc<CacheRefresher> {
        &self.refresher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::key_generator::{chapters_key, node_key, search_key, SearchQuery};
    use crate::caching::precache::PrecacheEngine;
    use crate::caching::stores::{InMemoryCache, InMemoryCacheConfig};
    use crate::scheduler::SingleFlight;
    use crate::test_support::{fake_gateway, BrokenStore, FakeTokenIssuer, FakeTransport};
    use std::time::Duration;

    fn admin(store: Arc<dyn CacheStore>) -> CacheAdmin {
        let gateway = fake_gateway(Arc::new(FakeTransport::new()), Arc::new(FakeTokenIssuer::new()));
        let engine = Arc::new(PrecacheEngine::new(store.clone(), gateway, Duration::from_secs(60)));
        let refresher = Arc::new(CacheRefresher::new(
            engine,
            SingleFlight::new(),
            "https://id.who.int/icd/release/11/2019-04/mms".to_string(),
            2,
        ));
        CacheAdmin::new(store, refresher)
    }

    #[tokio::test]
    async fn test_stats_counts_each_prefix() {
        let store = Arc::new(InMemoryCache::new(InMemoryCacheConfig::default()).unwrap());
        let ttl = Duration::from_secs(60);
        store.set(&chapters_key("2019-04"), b"{}", ttl).await.unwrap();
        store.set(&node_key("https://id.who.int/icd/entity/1"), b"{}", ttl).await.unwrap();
        store.set(&node_key("https://id.who.int/icd/entity/2"), b"{}", ttl).await.unwrap();
        store
            .set(&search_key("2019-04", &SearchQuery::new("cholera").to_params()), b"{}", ttl)
            .await
            .unwrap();

        let report = admin(store).stats().await.unwrap();

        assert_eq!(report.entries["chapters"], 1);
        assert_eq!(report.entries["node"], 2);
        assert_eq!(report.entries["search"], 1);
        assert_eq!(report.total, 4);
        assert!(report.healthy);
        assert!(!report.refresh_in_progress);
        assert!(report.last_refresh.is_none());
    }

    #[tokio::test]
    async fn test_empty_store_reports_zero() {
        let store = Arc::new(InMemoryCache::new(InMemoryCacheConfig::default()).unwrap());

        let report = admin(store).stats().await.unwrap();

        assert_eq!(report.total, 0);
        assert_eq!(report.entries.len(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_store_reports_unhealthy() {
        let report = admin(Arc::new(BrokenStore)).stats().await.unwrap();

        assert!(!report.healthy);
        assert_eq!(report.total, 0);
        assert_eq!(report.entries["node"], 0);
        assert_eq!(report.store.entries, 0);
    }
}
