//! # HTTP Transport
//!
//! Thin seam over the HTTP client so the fetch gateway can be exercised
//! without a network. The production implementation is a shared `reqwest`
//! client with connect and request timeouts.

use async_trait::async_trait;
use std::time::Duration;

use crate::core::config::UpstreamConfig;
use crate::core::error::{ProxyError, ProxyResult};

/// Raw upstream answer: status code and body text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs a GET request against the taxonomy API
#[async_trait]
pub trait Transport: Send + Sync {
    async fn http_get(
        &self,
        url: &str,
        headers: &[(String, String)],
        query: &[(String, String)],
    ) -> ProxyResult<TransportResponse>;
}

/// `reqwest`-backed transport
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &UpstreamConfig) -> ProxyResult<Self> {
        Self::with_timeouts(config.request_timeout, config.connect_timeout)
    }

    pub fn with_timeouts(request_timeout: Duration, connect_timeout: Duration) -> ProxyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProxyError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn http_get(
        &self,
        url: &str,
        headers: &[(String, String)],
        query: &[(String, String)],
    ) -> ProxyResult<TransportResponse> {
        let mut request = self.client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(TransportResponse { status, body })
    }
}
