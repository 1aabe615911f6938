//! HTTP handlers for the inbound surface.
//!
//! Every handler answers JSON; failures go through [`ProxyError`]'s
//! `IntoResponse` so clients always see the same error body.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use url::Url;

use super::router::AppState;
use crate::caching::{CacheStatsReport, SearchQuery};
use crate::core::error::{ProxyError, ProxyResult};
use crate::scheduler::RefreshTrigger;

const MAX_RELEASE_ID_LEN: usize = 32;

/// Release ids end up in upstream paths, so only path-safe characters pass
pub fn validate_release_id(release_id: &str) -> ProxyResult<()> {
    if release_id.is_empty() || release_id.len() > MAX_RELEASE_ID_LEN {
        return Err(ProxyError::invalid_request(
            "release_id",
            format!("must be 1 to {} characters", MAX_RELEASE_ID_LEN),
        ));
    }

    let allowed = release_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !allowed || release_id.contains("..") {
        return Err(ProxyError::invalid_request(
            "release_id",
            "may only contain letters, digits, '-', '_' and '.'",
        ));
    }

    Ok(())
}

/// Only URLs on the taxonomy API host may be fetched with our bearer token
pub fn validate_node_url(raw: &str, upstream_host: &str) -> ProxyResult<()> {
    let url = Url::parse(raw).map_err(|e| ProxyError::invalid_request("url", format!("not a valid URL: {}", e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProxyError::invalid_request("url", "scheme must be http or https"));
    }

    match url.host_str() {
        Some(host) if host.eq_ignore_ascii_case(upstream_host) => Ok(()),
        _ => Err(ProxyError::invalid_request(
            "url",
            format!("host must be {}", upstream_host),
        )),
    }
}

/// Response shape of the chapter listing, identical on hit and miss
pub fn project_chapters(release_id: &str, payload: &Value) -> Value {
    json!({
        "releaseId": payload.get("releaseId").cloned().unwrap_or_else(|| json!(release_id)),
        "title": payload.get("title").cloned().unwrap_or(Value::Null),
        "chapters": payload.get("child").cloned().unwrap_or_else(|| json!([])),
    })
}

#[instrument(skip(state))]
pub async fn get_chapters(
    State(state): State<AppState>,
    Path(release_id): Path<String>,
) -> ProxyResult<Json<Value>> {
    validate_release_id(&release_id)?;

    let payload = state.read_through.chapters(&release_id).await?;
    Ok(Json(project_chapters(&release_id, &payload)))
}

#[derive(Debug, Deserialize)]
pub struct NodeQuery {
    pub url: String,
}

#[instrument(skip(state, query))]
pub async fn get_node(
    State(state): State<AppState>,
    query: Result<Query<NodeQuery>, QueryRejection>,
) -> ProxyResult<Json<Value>> {
    let Query(NodeQuery { url }) = query.map_err(|e| ProxyError::invalid_request("url", e.body_text()))?;
    validate_node_url(&url, &state.upstream_host)?;

    debug!(%url, "Node lookup");
    state.read_through.node(&url).await.map(Json)
}

#[instrument(skip(state, query))]
pub async fn search(
    State(state): State<AppState>,
    Path(release_id): Path<String>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> ProxyResult<Json<Value>> {
    validate_release_id(&release_id)?;
    let Query(query) = query.map_err(|e| ProxyError::invalid_request("query", e.body_text()))?;
    if query.q.trim().is_empty() {
        return Err(ProxyError::invalid_request("q", "search text is required"));
    }

    state.read_through.search(&release_id, &query).await.map(Json)
}

pub async fn cache_stats(State(state): State<AppState>) -> ProxyResult<Json<CacheStatsReport>> {
    state.admin.stats().await.map(Json)
}

pub async fn cache_refresh(State(state): State<AppState>) -> Response {
    match state.admin.trigger_refresh() {
        RefreshTrigger::Started => (StatusCode::ACCEPTED, Json(json!({"status": "started"}))).into_response(),
        RefreshTrigger::AlreadyRunning => {
            (StatusCode::CONFLICT, Json(json!({"status": "already_running"}))).into_response()
        }
    }
}

/// Liveness check handler
pub async fn health_check() -> impl IntoResponse {
    let health_info = json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "taxonomy-proxy"
    });

    (StatusCode::OK, Json(health_info))
}

/// Prometheus exposition
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
