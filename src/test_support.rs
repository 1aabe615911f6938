//! In-process fakes shared by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{CredentialStore, TokenAccessor, TokenIssuer};
use crate::caching::stores::{CacheStore, CacheStoreStats};
use crate::caching::{CacheError, CacheResult};
use crate::core::config::UpstreamConfig;
use crate::core::error::{ProxyError, ProxyResult};
use crate::upstream::{FetchGateway, Transport, TransportResponse};

/// Issues `token-1`, `token-2`, ... and counts calls
#[derive(Default)]
pub struct FakeTokenIssuer {
    calls: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeTokenIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make the next `n` calls fail
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenIssuer for FakeTokenIssuer {
    async fn issue_token(&self) -> ProxyResult<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ProxyError::credential("invalid_client"));
        }

        Ok(format!("token-{}", call))
    }
}

#[derive(Debug, Clone)]
struct RecordedCall {
    url: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

/// Serves canned responses by URL and records every request
///
/// Unknown URLs answer 404.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, (u16, String)>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(self, url: &str, body: Value) -> Self {
        self.routes.lock().insert(url.to_string(), (200, body.to_string()));
        self
    }

    pub fn with_status(self, url: &str, status: u16, body: &str) -> Self {
        self.routes.lock().insert(url.to_string(), (status, body.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Change a route after construction
    pub fn set_json(&self, url: &str, body: Value) {
        self.routes.lock().insert(url.to_string(), (200, body.to_string()));
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|call| call.url == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn last_headers(&self) -> Option<Vec<(String, String)>> {
        self.calls.lock().last().map(|call| call.headers.clone())
    }

    pub fn last_query(&self) -> Option<Vec<(String, String)>> {
        self.calls.lock().last().map(|call| call.query.clone())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn http_get(
        &self,
        url: &str,
        headers: &[(String, String)],
        query: &[(String, String)],
    ) -> ProxyResult<TransportResponse> {
        self.calls.lock().push(RecordedCall {
            url: url.to_string(),
            headers: headers.to_vec(),
            query: query.to_vec(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let (status, body) = self
            .routes
            .lock()
            .get(url)
            .cloned()
            .unwrap_or_else(|| (404, "not found".to_string()));

        Ok(TransportResponse { status, body })
    }
}

pub fn fake_gateway(transport: Arc<FakeTransport>, issuer: Arc<FakeTokenIssuer>) -> Arc<FetchGateway> {
    let tokens = Arc::new(TokenAccessor::new(
        Arc::new(CredentialStore::new()),
        issuer,
        Duration::from_secs(15 * 60),
    ));
    Arc::new(FetchGateway::new(transport, tokens, &UpstreamConfig::default()))
}

/// Store whose every operation fails
pub struct BrokenStore;

#[async_trait]
impl CacheStore for BrokenStore {
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        Err(CacheError::Store { message: "connection refused".to_string() })
    }
    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::Store { message: "connection refused".to_string() })
    }
    async fn set_if_absent(&self, _key: &str, _value: &[u8], _ttl: Duration) -> CacheResult<bool> {
        Err(CacheError::Store { message: "connection refused".to_string() })
    }
    async fn exists(&self, _key: &str) -> CacheResult<bool> {
        Err(CacheError::Store { message: "connection refused".to_string() })
    }
    async fn count_prefix(&self, _prefix: &str) -> CacheResult<usize> {
        Err(CacheError::Store { message: "connection refused".to_string() })
    }
    async fn stats(&self) -> CacheResult<CacheStoreStats> {
        Err(CacheError::Store { message: "connection refused".to_string() })
    }
    async fn health_check(&self) -> CacheResult<bool> {
        Ok(false)
    }
}
