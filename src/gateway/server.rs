//! # HTTP Server Module
//!
//! Wires the proxy together from a [`ProxyConfig`]: cache store, credential
//! lifecycle, fetch gateway, read-through cache, pre-cache worker, refresh
//! loops and the axum router. Then serves until the shutdown token fires.
//!
//! ## Rust Concepts Used
//!
//! - `Arc<T>` for sharing components across async tasks
//! - trait objects (`Arc<dyn Transport>`, `Arc<dyn TokenIssuer>`) so tests can
//!   swap the network edges for in-process fakes
//! - `tokio_util::sync::CancellationToken` to stop every background task
//!   from one place
//! - `tokio::net::TcpListener` + `axum::serve` with graceful shutdown

use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::{CredentialStore, OAuth2TokenIssuer, TokenAccessor, TokenIssuer};
use crate::caching::key_generator::chapters_key;
use crate::caching::{
    build_store, CacheAdmin, CacheStore, PrecacheEngine, PrecacheQueue, ReadThroughCache, ReadThroughConfig,
};
use crate::core::config::ProxyConfig;
use crate::core::error::{ProxyError, ProxyResult};
use crate::routing::{build_router, AppState};
use crate::scheduler::{spawn_cache_loop, spawn_token_loop, CacheRefresher, Schedule, SingleFlight};
use crate::upstream::{FetchGateway, ReqwestTransport, Transport};

/// How long shutdown waits for each background task
const TASK_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ProxyServer {
    config: ProxyConfig,
    state: AppState,
    tokens: Arc<TokenAccessor>,
    refresher: Arc<CacheRefresher>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ProxyServer {
    /// Build the server with the store, token issuer and transport the
    /// configuration selects
    pub async fn new(
        config: ProxyConfig,
        metrics: Option<PrometheusHandle>,
        shutdown: CancellationToken,
    ) -> ProxyResult<Self> {
        let store = build_store(&config.cache).await?;
        let issuer = Arc::new(OAuth2TokenIssuer::new(&config.credentials)?);
        let transport = Arc::new(ReqwestTransport::new(&config.upstream)?);

        Self::with_components(config, store, issuer, transport, metrics, shutdown)
    }

    /// Build the server around caller-supplied edges
    ///
    /// Must be called inside a Tokio runtime; the pre-cache worker is
    /// spawned here.
    pub fn with_components(
        config: ProxyConfig,
        store: Arc<dyn CacheStore>,
        issuer: Arc<dyn TokenIssuer>,
        transport: Arc<dyn Transport>,
        metrics: Option<PrometheusHandle>,
        shutdown: CancellationToken,
    ) -> ProxyResult<Self> {
        let upstream_host = config.upstream_host().ok_or_else(|| {
            ProxyError::config(format!("upstream.base_url '{}' has no host", config.upstream.base_url))
        })?;

        let tokens = Arc::new(TokenAccessor::new(
            Arc::new(CredentialStore::new()),
            issuer,
            config.credentials.validity,
        ));
        let gateway = Arc::new(FetchGateway::new(transport, tokens.clone(), &config.upstream));
        let engine = Arc::new(PrecacheEngine::new(store.clone(), gateway.clone(), config.cache.node_ttl));

        let (queue, worker) = PrecacheQueue::spawn(
            engine.clone(),
            config.precache.queue_capacity,
            shutdown.child_token(),
        );
        let read_through = Arc::new(ReadThroughCache::new(
            store.clone(),
            gateway,
            Arc::new(queue),
            ReadThroughConfig::from_proxy_config(&config),
        ));

        let refresher = Arc::new(
            CacheRefresher::new(
                engine,
                SingleFlight::new(),
                config.canonical_root_url(),
                config.precache.full_tree_depth,
            )
            .with_listing_key(chapters_key(&config.upstream.default_release)),
        );
        let admin = Arc::new(CacheAdmin::new(store, refresher.clone()));

        let state = AppState {
            read_through,
            admin,
            metrics,
            upstream_host,
        };

        Ok(Self {
            config,
            state,
            tokens,
            refresher,
            shutdown,
            tasks: vec![worker],
        })
    }

    /// Router serving the inbound surface
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Start the token and cache refresh loops
    pub fn start_background_tasks(&mut self) {
        self.tasks.push(spawn_token_loop(
            self.tokens.clone(),
            Schedule::token(&self.config.credentials),
            self.shutdown.child_token(),
        ));
        self.tasks.push(spawn_cache_loop(
            self.refresher.clone(),
            Schedule::cache(&self.config.precache),
            self.shutdown.child_token(),
        ));
        info!("🔄 Background refresh loops started");
    }

    pub fn tokens(&self) -> &Arc<TokenAccessor> {
        &self.tokens
    }

    pub fn refresher(&self) -> &Arc<CacheRefresher> {
        &self.refresher
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.config.server.bind_address, self.config.server.port)
    }

    /// Serve HTTP until the shutdown token is cancelled, then drain the
    /// background tasks
    pub async fn start(self) -> ProxyResult<()> {
        let bind_addr = self.bind_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ProxyError::internal(format!("Failed to bind server to {}: {}", bind_addr, e)))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> ProxyResult<()> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ProxyError::internal(format!("Failed to read listener address: {}", e)))?;
        info!("🚀 Taxonomy proxy listening on {}", local_addr);

        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| ProxyError::internal(format!("Server error: {}", e)))?;

        info!("🛑 HTTP server stopped, draining background tasks");
        self.shutdown.cancel();
        for task in self.tasks {
            if tokio::time::timeout(TASK_DRAIN_TIMEOUT, task).await.is_err() {
                warn!("Background task did not stop within {:?}", TASK_DRAIN_TIMEOUT);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::{InMemoryCache, InMemoryCacheConfig};
    use crate::test_support::{FakeTokenIssuer, FakeTransport};
    use serde_json::json;

    const ROOT: &str = "https://id.who.int/icd/release/11/2019-04/mms";

    fn server(transport: Arc<FakeTransport>, shutdown: CancellationToken) -> ProxyServer {
        let mut config = ProxyConfig::default();
        config.server.bind_address = "127.0.0.1".to_string();
        config.server.port = 0;
        let store = Arc::new(InMemoryCache::new(InMemoryCacheConfig::default()).unwrap());

        ProxyServer::with_components(config, store, Arc::new(FakeTokenIssuer::new()), transport, None, shutdown)
            .unwrap()
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = server(Arc::new(FakeTransport::new()), CancellationToken::new());

        assert_eq!(server.bind_addr(), "127.0.0.1:0");
        assert_eq!(server.refresher().root_url(), ROOT);
    }

    #[tokio::test]
    async fn test_missing_upstream_host_is_rejected() {
        let mut config = ProxyConfig::default();
        config.upstream.base_url = "file:///tmp/icd".to_string();
        let store = Arc::new(InMemoryCache::new(InMemoryCacheConfig::default()).unwrap());

        let result = ProxyServer::with_components(
            config,
            store,
            Arc::new(FakeTokenIssuer::new()),
            Arc::new(FakeTransport::new()),
            None,
            CancellationToken::new(),
        );

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_background_tasks_warm_token_and_cache() {
        let transport = Arc::new(FakeTransport::new().with_json(ROOT, json!({"child": []})));
        let shutdown = CancellationToken::new();
        let mut server = server(transport.clone(), shutdown.clone());

        server.start_background_tasks();

        for _ in 0..100 {
            if server.tokens().store().current().is_some() && transport.calls_for(ROOT) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(server.tokens().store().current().is_some());
        assert_eq!(transport.calls_for(ROOT), 1);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_graceful_shutdown_stops_server() {
        let shutdown = CancellationToken::new();
        let server = server(Arc::new(FakeTransport::new()), shutdown.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let handle = tokio::spawn(server.serve(listener));
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(result.unwrap().unwrap().is_ok());
    }
}
