//! # Pre-Cache Engine
//!
//! Walks the children of a taxonomy node and stores every node it reaches, so
//! later reads of those nodes are served from cache. A walk is bounded by a
//! depth budget and by a visited set, which also makes it safe on graphs with
//! shared children or cycles.
//!
//! The walk uses an explicit stack instead of recursion, so its memory use is
//! bounded by the frontier rather than by the call stack.
//!
//! Walks started by read-through misses do not run on the request path: they
//! are submitted to a [`PrecacheQueue`], a bounded channel drained by a single
//! worker task. When the queue is full the job is dropped.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::key_generator::node_key;
use super::stores::CacheStore;
use crate::core::error::ProxyResult;
use crate::observability::metrics::{record_precache_job_dropped, record_precache_nodes_fetched};
use crate::upstream::FetchGateway;

/// Outcome counts of a single walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct WalkReport {
    /// Distinct nodes reached
    pub visited: usize,
    /// Nodes fetched from upstream
    pub fetched: usize,
    /// Nodes already in cache (or supplied by the caller)
    pub reused: usize,
    /// Non-root nodes whose fetch failed
    pub failed: usize,
}

/// Extract child URLs from a node payload
///
/// Children are listed under `child` or `children`; each entry is either a URL
/// string or an object carrying the URL in `@id` or `id`.
pub fn child_urls(node: &Value) -> Vec<String> {
    let children = node
        .get("child")
        .or_else(|| node.get("children"))
        .and_then(Value::as_array);

    let Some(children) = children else {
        return Vec::new();
    };

    children
        .iter()
        .filter_map(|child| match child {
            Value::String(url) => Some(url.clone()),
            Value::Object(object) => object
                .get("@id")
                .or_else(|| object.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

pub struct PrecacheEngine {
    store: Arc<dyn CacheStore>,
    gateway: Arc<FetchGateway>,
    ttl: Duration,
}

impl PrecacheEngine {
    pub fn new(store: Arc<dyn CacheStore>, gateway: Arc<FetchGateway>, ttl: Duration) -> Self {
        Self { store, gateway, ttl }
    }

    /// Walk from `root_url`, fetching the root if it is not cached
    ///
    /// Fails only if the root itself cannot be obtained.
    pub async fn walk(&self, root_url: &str, max_depth: u32) -> ProxyResult<WalkReport> {
        self.run(root_url, None, max_depth).await
    }

    /// Walk from a root whose payload the caller already holds
    pub async fn walk_seeded(&self, root_url: &str, payload: Value, max_depth: u32) -> ProxyResult<WalkReport> {
        self.run(root_url, Some(payload), max_depth).await
    }

    /// Store the payload of `url` under `alias_key` as well, unless that key is already set
    ///
    /// The payload comes from the node's own cache entry when present, so after
    /// a walk this costs no upstream call.
    pub async fn alias_if_absent(&self, url: &str, alias_key: &str) -> ProxyResult<()> {
        let (node, _) = self.load_or_fetch(&node_key(url), url).await?;
        self.store_if_absent(alias_key, &node).await;
        Ok(())
    }

    #[instrument(skip(self, seed), fields(seeded = seed.is_some()))]
    async fn run(&self, root_url: &str, mut seed: Option<Value>, max_depth: u32) -> ProxyResult<WalkReport> {
        let mut report = WalkReport::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack: Vec<(String, u32)> = vec![(root_url.to_string(), max_depth)];

        while let Some((url, remaining)) = stack.pop() {
            let key = node_key(&url);
            if !visited.insert(key.clone()) {
                continue;
            }
            report.visited += 1;
            let is_root = report.visited == 1;

            let node = match seed.take() {
                Some(payload) => {
                    self.store_if_absent(&key, &payload).await;
                    report.reused += 1;
                    payload
                }
                None => match self.load_or_fetch(&key, &url).await {
                    Ok((node, fetched)) => {
                        if fetched {
                            report.fetched += 1;
                        } else {
                            report.reused += 1;
                        }
                        node
                    }
                    Err(e) if is_root => return Err(e),
                    Err(e) => {
                        warn!(url = %url, "Pre-cache fetch failed, skipping branch: {}", e);
                        report.failed += 1;
                        continue;
                    }
                },
            };

            if remaining == 0 {
                continue;
            }

            // Reversed so children are visited in document order
            for child in child_urls(&node).into_iter().rev() {
                if !visited.contains(&node_key(&child)) {
                    stack.push((child, remaining - 1));
                }
            }
        }

        record_precache_nodes_fetched(report.fetched as u64);
        debug!(?report, "Pre-cache walk finished");
        Ok(report)
    }

    /// Cached payload for `key`, or a fresh fetch of `url` (stored if absent)
    ///
    /// The boolean is `true` when the node came from upstream.
    async fn load_or_fetch(&self, key: &str, url: &str) -> ProxyResult<(Value, bool)> {
        match self.store.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(node) => return Ok((node, false)),
                Err(e) => warn!(key = %key, "Discarding undecodable cache entry: {}", e),
            },
            Ok(None) => {}
            Err(e) => warn!(key = %key, "Cache read failed, fetching instead: {}", e),
        }

        let node = self.gateway.fetch(url).await?;
        self.store_if_absent(key, &node).await;
        Ok((node, true))
    }

    async fn store_if_absent(&self, key: &str, node: &Value) {
        let bytes = match serde_json::to_vec(node) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, "Failed to serialize node: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.set_if_absent(key, &bytes, self.ttl).await {
            warn!(key = %key, "Cache write failed: {}", e);
        }
    }
}

/// A walk requested by a read-through miss
#[derive(Debug, Clone)]
pub struct PrecacheJob {
    pub root_url: String,
    /// Payload of the root if the caller already fetched it
    pub payload: Option<Value>,
    pub depth: u32,
}

/// Bounded submission side of the miss-driven walk queue
pub struct PrecacheQueue {
    sender: mpsc::Sender<PrecacheJob>,
    submitted: AtomicU64,
    dropped: AtomicU64,
}

impl PrecacheQueue {
    /// Create the queue and the receiver a worker drains
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<PrecacheJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                submitted: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// Create the queue together with its worker task
    pub fn spawn(
        engine: Arc<PrecacheEngine>,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (queue, receiver) = Self::bounded(capacity);
        let worker = tokio::spawn(run_worker(engine, receiver, shutdown));
        (queue, worker)
    }

    /// Enqueue a job without waiting; returns `false` if it was dropped
    pub fn submit(&self, job: PrecacheJob) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => {
                self.submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                record_precache_job_dropped();
                warn!(root = %job.root_url, "Pre-cache queue full, dropping walk");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                record_precache_job_dropped();
                debug!(root = %job.root_url, "Pre-cache worker stopped, dropping walk");
                false
            }
        }
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Drain the queue one job at a time until shutdown or until every sender is gone
pub async fn run_worker(
    engine: Arc<PrecacheEngine>,
    mut receiver: mpsc::Receiver<PrecacheJob>,
    shutdown: CancellationToken,
) {
    info!("🌱 Pre-cache worker started");

    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let result = match job.payload {
            Some(payload) => engine.walk_seeded(&job.root_url, payload, job.depth).await,
            None => engine.walk(&job.root_url, job.depth).await,
        };

        match result {
            Ok(report) => debug!(root = %job.root_url, ?report, "Miss-driven walk complete"),
            Err(e) => warn!(root = %job.root_url, "Miss-driven walk failed: {}", e),
        }
    }

    info!("Pre-cache worker stopped");
}
