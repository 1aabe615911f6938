//! # Full-Tree Refresher
//!
//! Runs the pre-cache walk from the canonical root (the default release's
//! linearization) under the single-flight guard. Used both by the periodic
//! cache loop and by the manual refresh endpoint.
//!
//! The root is also the default release's chapter listing, so a successful
//! walk copies it under the listing key when one is configured.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::single_flight::{FlightGuard, SingleFlight};
use crate::caching::precache::{PrecacheEngine, WalkReport};
use crate::core::error::ProxyResult;

/// Result of a synchronous refresh request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed(WalkReport),
    AlreadyRunning,
}

/// Result of a fire-and-forget refresh request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Started,
    AlreadyRunning,
}

/// Summary of the most recent finished refresh
#[derive(Debug, Clone, Serialize)]
pub struct LastRefresh {
    pub finished_at: DateTime<Utc>,
    pub report: Option<WalkReport>,
    pub error: Option<String>,
}

pub struct CacheRefresher {
    engine: Arc<PrecacheEngine>,
    flight: Arc<SingleFlight>,
    root_url: String,
    depth: u32,
    listing_key: Option<String>,
    last: Mutex<Option<LastRefresh>>,
}

impl CacheRefresher {
    pub fn new(engine: Arc<PrecacheEngine>, flight: Arc<SingleFlight>, root_url: String, depth: u32) -> Self {
        Self {
            engine,
            flight,
            root_url,
            depth,
            listing_key: None,
            last: Mutex::new(None),
        }
    }

    /// Also warm this chapter listing key from the walked root
    pub fn with_listing_key<S: Into<String>>(mut self, key: S) -> Self {
        self.listing_key = Some(key.into());
        self
    }

    /// Run a full-tree walk to completion unless one is already in progress
    pub async fn refresh_now(&self) -> ProxyResult<RefreshOutcome> {
        let Some(guard) = self.flight.try_acquire() else {
            info!("Full-tree refresh already running, skipping");
            return Ok(RefreshOutcome::AlreadyRunning);
        };

        self.run_walk(guard).await.map(RefreshOutcome::Completed)
    }

    /// Start a full-tree walk in the background unless one is already in progress
    pub fn trigger(self: &Arc<Self>) -> RefreshTrigger {
        let Some(guard) = self.flight.try_acquire() else {
            return RefreshTrigger::AlreadyRunning;
        };

        let refresher = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = refresher.run_walk(guard).await {
                error!("Manually triggered refresh failed: {}", e);
            }
        });

        RefreshTrigger::Started
    }

    pub fn is_running(&self) -> bool {
        self.flight.is_running()
    }

    pub fn last_refresh(&self) -> Option<LastRefresh> {
        self.last.lock().clone()
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    async fn run_walk(&self, _guard: FlightGuard) -> ProxyResult<WalkReport> {
        info!(root = %self.root_url, depth = self.depth, "🌳 Starting full-tree refresh");

        let result = self.engine.walk(&self.root_url, self.depth).await;

        if let (Ok(_), Some(key)) = (&result, &self.listing_key) {
            if let Err(e) = self.engine.alias_if_absent(&self.root_url, key).await {
                warn!(key = %key, "Failed to warm chapter listing: {}", e);
            }
        }

        let record = match &result {
            Ok(report) => {
                info!(
                    visited = report.visited,
                    fetched = report.fetched,
                    reused = report.reused,
                    failed = report.failed,
                    "✅ Full-tree refresh complete"
                );
                LastRefresh {
                    finished_at: Utc::now(),
                    report: Some(*report),
                    error: None,
                }
            }
            Err(e) => LastRefresh {
                finished_at: Utc::now(),
                report: None,
                error: Some(e.to_string()),
            },
        };
        *self.last.lock() = Some(record);

        result
    }
}
