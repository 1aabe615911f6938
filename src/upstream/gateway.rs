//! # Fetch Gateway
//!
//! The single place that talks to the taxonomy API. Every request carries a
//! valid bearer token plus the API's content negotiation headers. Responses are
//! returned as opaque JSON; nothing here retries.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::transport::Transport;
use crate::auth::TokenAccessor;
use crate::core::config::UpstreamConfig;
use crate::core::error::{ProxyError, ProxyResult};
use crate::observability::metrics::record_upstream_fetch;

/// Longest upstream error body echoed into an error message
const MAX_ERROR_BODY: usize = 512;

pub struct FetchGateway {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenAccessor>,
    api_version: String,
    accept_language: String,
}

impl FetchGateway {
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<TokenAccessor>, config: &UpstreamConfig) -> Self {
        Self {
            transport,
            tokens,
            api_version: config.api_version.clone(),
            accept_language: config.accept_language.clone(),
        }
    }

    /// Fetch a resource by its full URL
    pub async fn fetch(&self, url: &str) -> ProxyResult<Value> {
        self.fetch_with_query(url, &[]).await
    }

    /// Fetch a resource with query parameters
    #[instrument(skip(self, query), fields(params = query.len()))]
    pub async fn fetch_with_query(&self, url: &str, query: &[(String, String)]) -> ProxyResult<Value> {
        let token = self.tokens.get_valid().await?;
        let headers = self.request_headers(&token);

        let response = match self.transport.http_get(url, &headers, query).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Upstream request failed: {}", e);
                record_upstream_fetch(Err(e.upstream_status_code()));
                return Err(e);
            }
        };

        if !response.is_success() {
            warn!(status = response.status, "Upstream returned an error status");
            record_upstream_fetch(Err(Some(response.status)));
            return Err(ProxyError::upstream_status(
                response.status,
                truncate(&response.body, MAX_ERROR_BODY),
            ));
        }

        let value = serde_json::from_str(&response.body).map_err(|e| {
            record_upstream_fetch(Err(None));
            ProxyError::upstream(format!("Upstream returned an undecodable body: {}", e))
        })?;

        record_upstream_fetch(Ok(()));
        debug!(status = response.status, "Fetched upstream resource");
        Ok(value)
    }

    fn request_headers(&self, token: &str) -> Vec<(String, String)> {
        vec![
            ("Authorization".to_string(), format!("Bearer {}", token)),
            ("Accept".to_string(), "application/json".to_string()),
            ("Accept-Language".to_string(), self.accept_language.clone()),
            ("API-Version".to_string(), self.api_version.clone()),
        ]
    }
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
