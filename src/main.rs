//! # Taxonomy Proxy - Main Entry Point
//!
//! A caching reverse proxy in front of the WHO ICD-11 API. Clients call the
//! proxy without credentials; the proxy holds the OAuth2 client credentials,
//! keeps a bearer token fresh, answers from its cache store whenever it can,
//! and pre-warms the taxonomy tree in the background.
//!
//! ## Startup sequence
//! 1. Load configuration (`PROXY_CONFIG_PATH`, default `config/proxy.yaml`)
//! 2. Initialize structured logging and the Prometheus recorder
//! 3. Build the server: cache store, credential lifecycle, fetch gateway,
//!    read-through cache, pre-cache worker
//! 4. Start the token and cache refresh loops
//! 5. Serve until SIGTERM or SIGINT, then stop every background task
//!
//! ## Error Handling at the Edge
//! Library code returns `ProxyResult<T>`; this binary converts everything
//! into `anyhow::Error` so startup failures print with their context chain.

use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use taxonomy_proxy::observability::{init_logging, install_prometheus};
use taxonomy_proxy::{ProxyConfig, ProxyServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ProxyConfig::load().await.context("Failed to load configuration")?;

    init_logging(&config.logging).context("Failed to initialize logging")?;
    info!("🚀 Starting taxonomy proxy");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let metrics = if config.metrics.enabled {
        let handle = install_prometheus().context("Failed to install metrics recorder")?;
        info!("📈 Prometheus metrics enabled");
        Some(handle)
    } else {
        None
    };

    info!(
        backend = ?config.cache.backend,
        upstream = %config.upstream.base_url,
        release = %config.upstream.default_release,
        "📋 Configuration loaded"
    );

    let shutdown = CancellationToken::new();
    let mut server = ProxyServer::new(config, metrics, shutdown.clone())
        .await
        .context("Failed to build proxy server")?;
    server.start_background_tasks();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("🛑 Shutdown signal received, beginning graceful shutdown...");
        signal_token.cancel();
    });

    server.start().await.context("Proxy server failed")?;

    info!("✅ Taxonomy proxy shutdown complete");
    Ok(())
}

/// Resolve on SIGTERM or SIGINT (Ctrl+C)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("📡 Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("📡 Received SIGTERM"),
    }
}
